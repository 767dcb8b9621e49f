//! Config command implementations

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use crate::setup::{write_file, Paths};

/// Print the config file as written
pub fn config_show(paths: &Paths) -> Result<()> {
    let path = paths.config_path();

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'relay config init' to create one");
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Print where the config file lives
pub fn config_path(paths: &Paths) -> Result<()> {
    println!("{}", paths.config_path().display());
    Ok(())
}

/// Write the default configuration, keeping an existing file unless `force`
pub fn config_init(paths: &Paths, force: bool) -> Result<()> {
    let path = paths.config_path();

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_file(&path, DEFAULT_CONFIG)?;
    print_success(&format!("Created configuration file: {:?}", path));
    print_info("Seal host passwords with 'relay vault seal' and paste them into the file");
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# relay-terminal configuration

# Custom device classes on top of Linux, MikroTik, Huawei and Cisco
device_types = []

[agent]
# Model identifier sent with every request
model = "google/gemini-2.5-flash"
# OpenAI-compatible API base URL
api_base = "https://openrouter.ai/api/v1"
# Environment variable holding the API key (or set api_key here)
api_key_env = "OPENROUTER_API_KEY"
# Reasoning calls per request before giving up (1-100)
max_iterations = 10
# Seconds to wait for one reasoning call
request_timeout = 60
# Look up the price of calls that report none
cost_lookup = true
# Milliseconds to wait for pending cost lookups at the end of a run
cost_grace = 2000
# Extra instructions placed before the built-in ones
# system_prompt = "Answer briefly."

[session]
# Seconds per address for connect and handshake
connect_timeout = 10
# Milliseconds of silence that end a command's output
idle_window = 300
# Milliseconds to wait for a command's first output
first_output_wait = 3000
# Seconds a single command capture may take
capture_ceiling = 30
# Sent after every agent command
line_terminator = "\r"
# Seconds after connecting during which terminal queries are answered
probe_window = 5
terminal = "xterm"
cols = 80
rows = 24

# [[hosts]]
# name = "edge-router"
# addresses = ["10.0.0.1", "192.168.88.1"]
# port = 22
# username = "admin"
# password = "v1:..."
# device_type = "MikroTik"
# disable_terminal_detection = true
# tags = ["core"]
# notes = "Uplink on ether1"
# knock = [{ protocol = "tcp", port = 7000 }, { protocol = "udp", port = 8000 }]
"#;
