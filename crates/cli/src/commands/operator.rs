use restock_engine::{Role, UserRegistry};

use super::print_json;
use crate::config::RestockConfig;
use crate::OutputFormat;

/// Register an operator. The password is read from `RESTOCK_PASSWORD`.
pub(crate) fn cmd_operator_add(
    config: &RestockConfig,
    username: &str,
    role: Role,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let users_file = config
        .access
        .users_file
        .as_ref()
        .ok_or("no users file configured; set [access] users_file in the config")?;
    let password = std::env::var("RESTOCK_PASSWORD")
        .map_err(|_| "RESTOCK_PASSWORD must be set to the new operator's password".to_string())?;

    let mut registry = UserRegistry::open(users_file).map_err(|e| e.to_string())?;
    registry
        .register(username, &password, role)
        .map_err(|e| e.to_string())?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "username": username.trim(),
            "role": role.as_str(),
        })),
        OutputFormat::Text => {
            if !quiet {
                println!("registered operator {} ({})", username.trim(), role);
            }
        }
    }
    Ok(())
}
