fn is_json_mode_args() -> bool {
    std::env::args().any(|arg| arg == "--json")
}

fn report(err: &regstats::CliError) {
    if is_json_mode_args() {
        let payload = serde_json::json!({
            "error": {
                "code": err.code,
                "kind": err.kind,
                "message": err.message,
                "hint": err.hint,
                "retryable": err.retryable,
            }
        });
        eprintln!("{payload}");
    } else {
        eprintln!("{}", err.message.trim_end());
        if let Some(hint) = &err.hint {
            eprintln!("hint: {hint}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let raw_args: Vec<String> = std::env::args().collect();
    let parsed = match regstats::parse_cli(raw_args) {
        Ok(parsed) => parsed,
        Err(err) if err.code == 0 => {
            // --help / --version
            print!("{}", err.message);
            return Ok(());
        }
        Err(err) => {
            report(&err);
            std::process::exit(err.code);
        }
    };

    match regstats::run_with_parsed(parsed) {
        Ok(()) => Ok(()),
        Err(err) => {
            report(&err);
            std::process::exit(err.code);
        }
    }
}
