//! ID generation utilities for flowrun
//!
//! Provides functions for generating identifiers for flow and node runs.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique flow run ID
///
/// Format: `{timestamp_ms}-{random_hex}`
/// Example: `1738300800123-a1b2c3d4`
pub fn generate_run_id() -> String {
    let random: u32 = rand::rng().random();
    format!("{}-{:08x}", now_ms(), random)
}

/// Generate the run ID of a node within a flow run
///
/// Format: `{flow_run_id}_{node_name}`
pub fn node_run_id(flow_run_id: &str, node_name: &str) -> String {
    format!("{}_{}", flow_run_id, node_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_run_id_format() {
        let id = generate_run_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_run_id_uniqueness() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(generate_run_id()), "Generated duplicate ID");
        }
    }

    #[test]
    fn test_node_run_id() {
        assert_eq!(node_run_id("123-abcd", "fetch"), "123-abcd_fetch");
    }
}
