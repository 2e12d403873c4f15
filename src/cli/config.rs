use std::fs;
use std::path::PathBuf;

const SAMPLE_CONFIG: &str = include_str!("../../samples/sample-config.yml");

pub fn sample_config() -> &'static str {
    SAMPLE_CONFIG
}

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    write_config(SAMPLE_CONFIG, stdout)
}

fn write_config(config_content: &str, stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Try ~/.config/sprayer/config.yml first
    let config_path = dirs::home_dir()
        .map(|home| home.join(".config/sprayer/config.yml"))
        .filter(|path| match path.parent().map(fs::create_dir_all) {
            Some(Ok(())) => true,
            Some(Err(_)) => {
                eprintln!("Warning: Could not create directory {}", path.display());
                eprintln!("Falling back to /etc/sprayer/config.yml");
                false
            }
            None => false,
        })
        .unwrap_or_else(|| PathBuf::from("/etc/sprayer/config.yml"));

    if config_path.exists() {
        return Err(format!(
            "config file already exists at {}; remove it first or use --stdout to print the config",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}
