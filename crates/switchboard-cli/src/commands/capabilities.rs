//! `switchboard capabilities`: list what the registry announces.

use switchboard_core::models::CapabilityDescriptor;
use switchboard_core::registry::RegistryClient;
use switchboard_core::WorkflowConfig;

use super::print_json;

pub async fn list(config: &WorkflowConfig, json: bool) -> Result<(), String> {
    let registry = RegistryClient::from_config(&config.registry);
    if !registry.is_configured() {
        println!("No capability registry configured.");
        return Ok(());
    }

    let discovery = registry.discover().await;
    if let Some(error) = discovery.error {
        return Err(error);
    }

    if json {
        return print_json(&discovery.capabilities);
    }

    if discovery.capabilities.is_empty() {
        println!("The registry announced no capabilities.");
        return Ok(());
    }
    for line in table(&discovery.capabilities) {
        println!("{}", line);
    }
    Ok(())
}

/// Rows for the plain-text listing, header first.
pub fn table(capabilities: &[CapabilityDescriptor]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<24} {:<10} {:<6} {}",
        "ID", "ROUTING", "PROTO", "ENDPOINT"
    )];
    lines.extend(capabilities.iter().map(|c| {
        format!(
            "{:<24} {:<10} {:<6} {}",
            truncate(&c.id, 24),
            c.routing().to_string(),
            c.protocol.to_string(),
            c.base_url()
        )
    }));
    lines
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_shows_routing_and_endpoint() {
        let caps = vec![CapabilityDescriptor::new("brave-search", "10.0.0.5", 8080, "search")];
        let lines = table(&caps);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("brave-search"));
        assert!(lines[1].contains("search"));
        assert!(lines[1].ends_with("http://10.0.0.5:8080"));
    }

    #[test]
    fn test_truncate_long_ids() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
