//! PALIMPSEST - In-Memory MVCC Record Store
//! Interactive shell over a single shared store.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use palimpsest::config::Config;
use palimpsest::engine::concurrent::Store;
use palimpsest::shell::Shell;

fn main() {
    env_logger::init();

    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║            PALIMPSEST Store               ║");
    println!("  ║       In-Memory MVCC Record Store         ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Commands:");
    println!("    begin [name]                 - Start a transaction");
    println!("    insert <txn> <key> <value>   - Insert a new record");
    println!("    update <txn> <key> <value>   - Write a new version");
    println!("    delete <txn> <key>           - Delete a record");
    println!("    commit [txn] / abort [txn]   - Finish a transaction");
    println!("    query [txn] [text]           - Read a snapshot (top-2 by text)");
    println!("    export [txn]                 - Snapshot as JSON");
    println!("    history <key>                - Show a version chain");
    println!("    info                         - Show store statistics");
    println!("    exit                         - Quit");
    println!();

    let config = Config::new().with_wait_timeout(Duration::from_secs(10));
    let store = Arc::new(Store::with_config(config));
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    print!("  User name: ");
    let _ = stdout.flush();
    let mut user = String::new();
    if stdin.lock().read_line(&mut user).unwrap_or(0) == 0 {
        return;
    }
    let user = match user.trim() {
        "" => "anon".to_string(),
        name => name.to_string(),
    };
    let mut shell = Shell::new(store, user);

    loop {
        print!("{}> ", shell.user());
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(err) => {
                eprintln!("[ERROR] Failed to read input: {}", err);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "q") {
            println!("  Shutting down PALIMPSEST...");
            break;
        }

        match shell.process_line(line) {
            Ok(out) => {
                for out_line in out.lines() {
                    println!("  {}", out_line);
                }
            }
            Err(e) => println!("  ERROR: {}", e),
        }
    }
}
