//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `miniapp_core` linkage.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `miniapp_cli [deep-link]`. With an argument, prints the parsed
//! link as JSON (or `null` when unrecognized).

use miniapp_core::{DeepLinkResolver, KernelConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("miniapp_core ping={}", miniapp_core::ping());
    println!("miniapp_core version={}", miniapp_core::core_version());

    let Some(raw) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    let config = KernelConfig::default();
    let resolver = DeepLinkResolver::new(&config.deep_link_scheme, &config.web_hosts);
    match serde_json::to_string(&resolver.parse(&raw)) {
        Ok(json) => {
            println!("deep_link={json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to encode deep link: {err}");
            ExitCode::FAILURE
        }
    }
}
