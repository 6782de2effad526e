//! Shared test helpers for integration tests
//!
//! This module provides common utilities used across all test files.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

pub const TEAM: &str = r#"members:
  - tenant: acme
    username: boss
    name: Bo Manager
    roles: [manager]
    department: purchasing
  - tenant: acme
    username: cfo
    name: Cy Finance
    position: CFO
  - tenant: acme
    username: deputy
    name: Dee Deputy
  - tenant: acme
    username: req
    name: Rae Requester
    department: engineering
"#;

pub const PO_TEMPLATE: &str = r#"tenant: acme
code: PO-STD
name: Standard purchase order
document_type: purchase_order
auto_approve_amount: 1000
steps:
  - step_order: 1
    name: Manager approval
    approver_type: role
    approver: manager
  - step_order: 2
    name: Finance approval
    approver_type: position
    approver: CFO
"#;

/// Helper to get an aprv command isolated from the user's own config
pub fn aprv(tmp: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("aprv"));
    cmd.current_dir(tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join(".xdg"))
        .env("HOME", tmp.path())
        .env("USER", "tester")
        .env_remove("USERNAME")
        .env_remove("APRV_TENANT")
        .env_remove("APRV_USER")
        .env_remove("APRV_DB")
        .env_remove("APRV_LOG");
    cmd
}

/// Helper to create a test project for tenant `acme` in a temp directory
pub fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    aprv(&tmp).args(["--tenant", "acme", "init"]).assert().success();
    tmp
}

/// Project with a roster and the standard PO template imported
pub fn setup_po_project() -> TempDir {
    let tmp = setup_test_project();
    fs::write(tmp.path().join("team.yaml"), TEAM).unwrap();
    write_template(&tmp, "po-std.yaml", PO_TEMPLATE);
    aprv(&tmp).args(["template", "import"]).assert().success();
    tmp
}

pub fn write_template(tmp: &TempDir, name: &str, content: &str) {
    fs::write(tmp.path().join("templates").join(name), content).unwrap();
}

pub fn write_line(tmp: &TempDir, name: &str, content: &str) {
    fs::write(tmp.path().join("lines").join(name), content).unwrap();
}

/// Request approval and return the new instance ID
pub fn request_po(tmp: &TempDir, document_id: &str, amount: &str) -> String {
    let output = aprv(tmp)
        .args([
            "--as",
            "req",
            "--format",
            "id",
            "request",
            "purchase_order",
            document_id,
            "--amount",
            amount,
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
