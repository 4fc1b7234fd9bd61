mod settings;

pub use settings::{AuditConfig, EXAMPLE_CONFIG, ENV_AUDIT, ENV_AUDIT_DIR};
