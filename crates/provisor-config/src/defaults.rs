//! Built-in option defaults.
//!
//! # Design
//! - Keep every fallback value in one place so resolution never scatters defaults.
//! - Values mirror the stock Ansible provisioner configuration.

/// Directory inside the target that receives the generated inventory.
pub const INVENTORY_DIR: &str = "/etc/ansible";
/// Inventory file name written inside `INVENTORY_DIR`.
pub const INVENTORY_FILENAME: &str = "hosts";
/// Inventory body used when none is configured.
pub const INVENTORY_CONTENT: &str = "127.0.0.1";
/// Location inside the target where playbooks are staged.
pub const PLAYBOOKS_DEST: &str = "/var/lib/ansible/playbooks";
/// External tool invoked against the staged playbooks.
pub const TOOL: &str = "ansible-playbook";
/// Marker variable always passed to the tool as `<marker>=True`.
pub const MARKER_VAR: &str = "ami";
/// Environment variable carrying the vault password.
pub const VAULT_PASSWORD_ENV: &str = "VAULT_PWD";
/// Binary used to enter the target root when executing inside it.
pub const CHROOT_BINARY: &str = "chroot";
