//! Minimal CLI surface over `keyring_core`, demonstrating the command set
//! a desktop shell would wire into its own UI. Not part of the library's
//! public contract.

use std::env;
use std::path::PathBuf;

use keyring_core::{CoreConfig, Fingerprint, KeyringService, TrustLevel};

fn usage() -> ! {
    eprintln!(
        "usage: keyring-core-demo <data-dir> <command> [args...]\n\
         commands:\n\
         \u{20}\u{20}generate <name> <email> [passphrase]\n\
         \u{20}\u{20}list\n\
         \u{20}\u{20}search <query>\n\
         \u{20}\u{20}export <fingerprint>\n\
         \u{20}\u{20}delete <fingerprint>\n\
         \u{20}\u{20}set-trust <fingerprint> <unknown|imported|verified>"
    );
    std::process::exit(2);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let data_dir = PathBuf::from(args.next().unwrap_or_else(|| usage()));
    let command = args.next().unwrap_or_else(|| usage());

    let config = CoreConfig::ephemeral(&data_dir);
    let service = match KeyringService::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to initialize keyring: {e}");
            std::process::exit(1);
        }
    };

    let result = match command.as_str() {
        "generate" => {
            let name = args.next().unwrap_or_else(|| usage());
            let email = args.next().unwrap_or_else(|| usage());
            let passphrase = args.next();
            service
                .generate(&name, &email, passphrase.as_deref())
                .map(|record| println!("generated {}", record.fingerprint))
        }
        "list" => service.list_keys().map(|records| {
            for record in records {
                println!(
                    "{} own={} trust={}",
                    record.fingerprint,
                    record.is_own_key,
                    record.trust_level.as_str()
                );
            }
        }),
        "search" => {
            let query = args.next().unwrap_or_else(|| usage());
            service.search_keys(&query).map(|records| {
                for record in records {
                    println!("{}", record.fingerprint);
                }
            })
        }
        "export" => {
            let fp = parse_fp(args.next());
            service.export(&fp, false).map(|bytes| {
                print!("{}", String::from_utf8_lossy(&bytes));
            })
        }
        "delete" => {
            let fp = parse_fp(args.next());
            service.delete(&fp).map(|()| println!("deleted {fp}"))
        }
        "set-trust" => {
            let fp = parse_fp(args.next());
            let level = args
                .next()
                .and_then(|s| TrustLevel::parse(&s))
                .unwrap_or_else(|| usage());
            service
                .set_trust(&fp, level)
                .map(|()| println!("trust updated"))
        }
        _ => usage(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn parse_fp(arg: Option<String>) -> Fingerprint {
    let s = arg.unwrap_or_else(|| usage());
    Fingerprint::parse(&s).unwrap_or_else(|_| usage())
}
