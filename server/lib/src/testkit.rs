use std::str::FromStr;

use virtdir_proto::config::LimitsConfig;

use crate::config::ServerConfig;
use crate::prelude::*;

pub struct TestConfiguration {
    pub search_max_results: usize,
    pub search_time_limit_ms: Option<u64>,
    /// Start with the builtin virtual attribute rules.
    pub with_rules: bool,
}

impl Default for TestConfiguration {
    fn default() -> Self {
        TestConfiguration {
            search_max_results: 0,
            search_time_limit_ms: None,
            with_rules: true,
        }
    }
}

pub fn setup_test(config: TestConfiguration) -> DirectoryServer {
    sketching::test_init();

    let server_config = ServerConfig {
        default_rules: config.with_rules,
        limits: LimitsConfig {
            search_max_results: config.search_max_results,
            search_time_limit_ms: config.search_time_limit_ms,
            ..Default::default()
        },
        ..Default::default()
    };
    DirectoryServer::new(&server_config)
}

/// Add json entries in order and commit.
#[allow(clippy::expect_used)]
pub fn add_entries(server: &DirectoryServer, entries: &[&str]) {
    let mut wr = server.write();
    for es in entries {
        let entry = Entry::from_json_str(es).expect("invalid test entry");
        wr.add_entry(entry).expect("failed to add test entry");
    }
    wr.commit().expect("failed to commit test entries");
}

#[allow(clippy::expect_used)]
pub fn dn(s: &str) -> Dn {
    Dn::from_str(s).expect("invalid test dn")
}
