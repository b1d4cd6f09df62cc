use argus_core::{Config, Paths};
use argus_render::Engine;

/// Run full environment diagnostics.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!();
    println!("🩺 argus doctor — Environment Diagnostics");
    println!("================================");
    println!();

    let mut ok_count = 0u32;
    let mut warn_count = 0u32;
    let mut err_count = 0u32;

    // --- 1. Config ---
    println!("📋 Configuration");
    if paths.config_file().exists() {
        print_ok("Config file exists", &paths.config_file().display().to_string());
        ok_count += 1;
    } else {
        print_warn("Config file not found", "Defaults apply; create config.json to customize");
        warn_count += 1;
    }

    let config = Config::load_or_default(&paths)?;

    let pages_file = config.pages_file(&paths);
    if pages_file.exists() {
        print_ok("Page configuration exists", &pages_file.display().to_string());
        ok_count += 1;
    } else {
        print_err(
            "Page configuration not found",
            "The service starts empty without pages.json",
        );
        err_count += 1;
    }

    let cookies_file = config.cookies_file(&paths);
    if cookies_file.exists() {
        print_ok("Cookie table exists", &cookies_file.display().to_string());
        ok_count += 1;
    } else {
        print_warn("Cookie table not found", "Captures run without cookies");
        warn_count += 1;
    }
    println!();

    // --- 2. Capture directory ---
    println!("📁 Capture directory");
    let capture_dir = config.capture_dir(&paths);
    if capture_dir.exists() {
        let rounds = std::fs::read_dir(&capture_dir)
            .map(|entries| entries.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()).count())
            .unwrap_or(0);
        print_ok(
            "Capture directory exists",
            &format!("{} ({} rounds)", capture_dir.display(), rounds),
        );
        ok_count += 1;

        // Check writable
        let test_file = capture_dir.join(".doctor_test");
        match std::fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_file);
                print_ok("Capture directory writable", "");
                ok_count += 1;
            }
            Err(e) => {
                print_err("Capture directory not writable", &e.to_string());
                err_count += 1;
            }
        }
    } else {
        print_warn("Capture directory not created yet", "Created on first serve");
        warn_count += 1;
    }
    println!();

    // --- 3. Renderer engines ---
    println!("🖥  Renderer engines");
    for name in ["phantomjs", "slimerjs"] {
        let engine = Engine::get(Some(name));
        match engine.resolve_binary() {
            Ok(path) => {
                print_ok(name, &path.display().to_string());
                ok_count += 1;
            }
            Err(_) => {
                print_warn(
                    &format!("{} not found", name),
                    &format!("Install it or set ARGUS_{}_PATH", name.to_uppercase()),
                );
                warn_count += 1;
            }
        }
    }

    let script = std::path::Path::new(&config.capture.render_script);
    if script.exists() {
        print_ok("Capture script exists", &script.display().to_string());
        ok_count += 1;
    } else {
        print_err(
            "Capture script not found",
            &config.capture.render_script,
        );
        err_count += 1;
    }
    println!();

    // --- Summary ---
    println!("================================");
    println!(
        "Summary: {} ok, {} warnings, {} errors",
        ok_count, warn_count, err_count
    );
    println!();

    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {} — {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {} — {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {} — {}", label, hint);
    }
}
