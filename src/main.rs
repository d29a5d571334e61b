use std::io::{self, BufRead, Write};
use std::process;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use datorest::database::Database;
use datorest::settings::Settings;

fn run(path: Option<&str>) -> datorest::Result<()> {
    let settings = Settings::load(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)))
        .init();
    let db = Database::from_settings(&settings)?;
    if settings.create {
        db.create()?;
    }
    info!(alias = %db.alias(), url = %settings.base_url(), info = %db.info()?, "connected");

    let stdin = io::stdin();
    loop {
        print!("{}> ", db.alias());
        io::stdout().flush().ok();
        let mut entered = String::new();
        if stdin.lock().read_line(&mut entered)? == 0 {
            break;
        }
        let entered = entered.trim();
        match entered {
            "" => continue,
            "quit" => break,
            query => match db.q(query, &[], None, None, false) {
                Ok(rows) => {
                    for row in &rows {
                        let row: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                        println!("{}", row.join("\t"));
                    }
                    println!("({} rows)", rows.len());
                }
                Err(e) => error!("{}", e),
            },
        }
    }
    Ok(())
}

fn main() {
    let path = std::env::args().nth(1);
    if let Err(e) = run(path.as_deref()) {
        eprintln!("datorest: {}", e);
        process::exit(1);
    }
}
