//! Check command implementation.
//!
//! Validates privileges, the configuration, and access to the target process.

use crate::config::{validate_effective_config, Config};
use crate::startup_checks::{check_maps_access, check_ptrace_privileges};
use mc_inspector::memcached::load_stats;

/// Validates system requirements and configuration.
pub fn command_check(pid: Option<i32>, config: &Config) -> anyhow::Result<()> {
    println!("🔍 mc-inspector - System Check");
    println!("===============================");

    let mut all_ok = true;

    println!("\n🔑 Checking privileges...");
    match check_ptrace_privileges() {
        Ok(true) => println!("   ✅ Running as root"),
        Ok(false) => println!("   ⚠️  Not root - ptrace access depends on CAP_SYS_PTRACE or ptrace_scope"),
        Err(e) => {
            println!("   ❌ {}", e);
            all_ok = false;
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {:#}", e);
            all_ok = false;
        }
    }

    // Resolve the target: explicit pid wins over the stats file
    let target = match (pid, config.stats_file.as_deref()) {
        (Some(pid), _) => Some(pid),
        (None, Some(path)) => {
            println!("\n📄 Checking stats file...");
            match load_stats(path) {
                Ok(snapshot) => {
                    println!(
                        "   ✅ {} parsed: pid={}, cas_enabled={}, {} slab classes",
                        path.display(),
                        snapshot.pid,
                        snapshot.cas_enabled,
                        snapshot.slabs.populated().count()
                    );
                    Some(snapshot.pid)
                }
                Err(e) => {
                    println!("   ❌ {}", e);
                    all_ok = false;
                    None
                }
            }
        }
        (None, None) => None,
    };

    println!("\n🧠 Checking target memory map...");
    match target {
        Some(pid) => match check_maps_access(pid) {
            Ok(regions) => println!("   ✅ pid {}: {} heap regions readable", pid, regions),
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        },
        None => println!("   ⚠️  No target given (use --pid or --stats-file)"),
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - ready to inspect");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        std::process::exit(1);
    }
}
