//! Hosts command implementation

use anyhow::Result;

use crate::output::format_hosts;
use crate::setup::{load_app_config, Paths};

/// List saved hosts, optionally only those carrying every tag in `tags`
pub fn hosts_command(paths: &Paths, tags: &[String], long: bool) -> Result<()> {
    let config = load_app_config(paths)?;
    let hosts: Vec<_> = config
        .hosts
        .into_iter()
        .filter(|h| tags.iter().all(|t| h.has_tag(t)))
        .collect();

    println!("{}", format_hosts(&hosts, long));
    Ok(())
}
