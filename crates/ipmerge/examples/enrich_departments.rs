//! Add department data to an existing country database.
//!
//! Usage: enrich_departments [INPUT] [OUTPUT]
//!
//! Defaults to GeoLite2-Country.mmdb and
//! GeoLite2-Country-with-Department-Data.mmdb in the current directory.

use anyhow::{Context, Result};
use ipmerge::merge::TopLevelMerge;
use ipmerge::{Database, Options, Value};
use std::net::IpAddr;

fn department(name: &str, environments: &[&str]) -> Value {
    Value::map([
        ("AcmeCorp.DeptName", Value::from(name)),
        (
            "AcmeCorp.Environments",
            Value::slice(environments.iter().copied()),
        ),
    ])
}

fn main() -> Result<()> {
    stderrlog::new().verbosity(2).init()?;

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .unwrap_or_else(|| "GeoLite2-Country.mmdb".to_string());
    let output = args
        .next()
        .unwrap_or_else(|| "GeoLite2-Country-with-Department-Data.mmdb".to_string());

    let mut db = Database::open(&input, Options::default())
        .with_context(|| format!("loading {}", input))?;

    let departments = [
        (
            "56.0.0.0/16",
            department("SRE", &["development", "staging", "production"]),
        ),
        (
            "56.1.0.0/16",
            department("Development", &["development", "staging"]),
        ),
        (
            "56.2.0.0/16",
            department("Management", &["development", "staging"]),
        ),
    ];
    for (network, data) in departments {
        db.insert_with(network, &TopLevelMerge::new(data))
            .with_context(|| format!("inserting {}", network))?;
    }

    db.write_file(&output)
        .with_context(|| format!("writing {}", output))?;

    let enriched = Database::open(&output, Options::default())?;
    for addr in ["56.0.0.1", "56.1.0.1", "56.2.0.1"] {
        let addr: IpAddr = addr.parse()?;
        match enriched.lookup(addr) {
            Some(hit) => println!(
                "{}/{}: {}",
                addr,
                hit.prefix_len,
                serde_json::to_string(hit.value)?
            ),
            None => println!("{}: not found", addr),
        }
    }

    Ok(())
}
