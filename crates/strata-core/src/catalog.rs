//! Built-in models describing an infrastructure environment.
//!
//! The graph is rooted at `Environment`; `EnvironmentLock` is a separate root
//! that only coordinates writers.

use crate::error::SchemaError;
use crate::registry::{Registry, RegistryBuilder};
use crate::schema::ModelBuilder;
use crate::value::PropertyKind::{Bool, Int};

/// Build the registry of every built-in model.
pub fn registry() -> Result<Registry, SchemaError> {
    let mut r = RegistryBuilder::new();

    // ── Environment ──────────────────────────────────────────────

    r.define(
        ModelBuilder::new("Environment")
            .identity("uuid")
            .statics(&["account_number", "name"])
            .typed_static("last_sync", Int)
            .states(&["status"])
            .child("hosts", "HAS_HOST", "Host")
            .child("gitrepos", "HAS_GIT_REPO", "GitRepo")
            .child("uservars", "HAS_USERVAR", "Uservar"),
    )?;

    r.define(
        ModelBuilder::new("EnvironmentLock")
            .identity("uuid")
            .statics(&["account_number", "name"])
            .typed_static("locked", Int),
    )?;

    r.define(
        ModelBuilder::new("Uservar")
            .identity_concat("name_environment", &["name", "environment"])
            .statics(&["name", "environment"])
            .states(&["value"]),
    )?;

    // ── Host ─────────────────────────────────────────────────────

    r.define(
        ModelBuilder::new("Host")
            .identity_concat("hostname_environment", &["hostname", "environment"])
            .statics(&["hostname", "environment"])
            .states(&["architecture", "bios_date", "bios_version"])
            .states(&["default_ipv4_address", "default_ipv6_address", "kernel"])
            .typed_state("memtotal_mb", Int)
            .states(&[
                "lsb_codename",
                "lsb_description",
                "lsb_id",
                "lsb_major_release",
                "lsb_release",
                "fqdn",
                "pkg_mgr",
            ])
            .typed_state("processor_cores", Int)
            .typed_state("processor_count", Int)
            .typed_state("processor_threads_per_core", Int)
            .typed_state("processor_vcpus", Int)
            .states(&["python_executable", "python_version", "python_type"])
            .states(&["service_mgr"])
            .typed_state("selinux", Bool)
            .states(&["ansible_version_full"])
            .child("aptpackages", "HAS_APT_PACKAGE", "AptPackage")
            .child("virtualenvs", "HAS_VIRTUALENV", "Virtualenv")
            .child("configfiles", "HAS_CONFIG_FILE", "Configfile")
            .child("nameservers", "HAS_NAMESERVER", "NameServer")
            .child("interfaces", "HAS_INTERFACE", "Interface")
            .child("kernelmodules", "HAS_KERNEL_MODULE", "KernelModule")
            .child("mounts", "HAS_MOUNT", "Mount")
            .child("devices", "HAS_DEVICE", "Device")
            .child(
                "configuredinterfaces",
                "HAS_CONFIGURED_INTERFACE",
                "ConfiguredInterface",
            ),
    )?;

    r.define(
        ModelBuilder::new("AptPackage")
            .identity_concat("name_version", &["name", "version"])
            .statics(&["name", "version"])
            .shared(),
    )?;

    r.define(
        ModelBuilder::new("Virtualenv")
            .identity_concat("path_host", &["path", "host"])
            .statics(&["path", "host"])
            .child("pythonpackages", "HAS_PYTHON_PACKAGE", "PythonPackage"),
    )?;

    r.define(
        ModelBuilder::new("PythonPackage")
            .identity_concat("name_version", &["name", "version"])
            .statics(&["name", "version"])
            .shared(),
    )?;

    r.define(
        ModelBuilder::new("Configfile")
            .identity_concat("path_host", &["path", "host"])
            .statics(&["path", "host", "name"])
            .states(&["md5", "contents", "is_binary"]),
    )?;

    r.define(ModelBuilder::new("NameServer").identity("ip").shared())?;

    r.define(
        ModelBuilder::new("Interface")
            .identity_concat("device_host", &["device", "host"])
            .statics(&["device", "host"])
            .states(&["active", "ipv4_address", "ipv6_address", "macaddress"])
            .typed_state("mtu", Int)
            .states(&["promisc", "type"]),
    )?;

    r.define(
        ModelBuilder::new("ConfiguredInterface")
            .identity_concat("device_host", &["device", "host"])
            .statics(&["device", "host"])
            .typed_state("mtu", Int)
            .states(&[
                "offload_sg",
                "bridge_waitport",
                "bridge_fd",
                "bridge_ports",
                "bridge_stp",
                "address",
                "netmask",
                "dns_nameservers",
                "gateway",
            ]),
    )?;

    r.define(
        ModelBuilder::new("KernelModule")
            .identity_concat("name_host", &["name", "host"])
            .statics(&["name", "host"])
            .child("parameters", "HAS_PARAMETER", "KernelModuleParameter"),
    )?;

    r.define(
        ModelBuilder::new("KernelModuleParameter")
            .identity_concat("name_value", &["name", "value"])
            .statics(&["name", "value"])
            .shared(),
    )?;

    r.define(
        ModelBuilder::new("Mount")
            .identity_concat("mount_host", &["mount", "host"])
            .statics(&["mount", "host"])
            .states(&["device", "size_total", "fstype"]),
    )?;

    r.define(
        ModelBuilder::new("Device")
            .identity_concat("name_host", &["name", "host"])
            .statics(&["name", "host"])
            .states(&["removable", "rotational", "size"])
            .child("partitions", "HAS_PARTITION", "Partition"),
    )?;

    r.define(
        ModelBuilder::new("Partition")
            .identity_concat("name_device", &["name", "device"])
            .statics(&["name", "device"])
            .states(&["size", "start"]),
    )?;

    // ── Git ──────────────────────────────────────────────────────

    r.define(
        ModelBuilder::new("GitRepo")
            .identity_concat("path_environment", &["path", "environment"])
            .statics(&["path", "environment"])
            .states(&["active_branch_name", "head_sha"])
            .typed_state("is_detached", Bool)
            .typed_state("working_tree_dirty", Bool)
            .states(&[
                "working_tree_diff_md5",
                "merge_base_name",
                "merge_base_diff_md5",
            ])
            .child("untrackedfiles", "HAS_UNTRACKED_FILE", "GitUntrackedFile")
            .child("remotes", "HAS_GIT_REMOTE", "GitRemote"),
    )?;

    r.define(ModelBuilder::new("GitUntrackedFile").identity("path").shared())?;

    r.define(
        ModelBuilder::new("GitRemote")
            .identity_concat("name_repo", &["name", "repo"])
            .statics(&["name", "repo"])
            .child("urls", "HAS_GIT_URL", "GitUrl"),
    )?;

    r.define(ModelBuilder::new("GitUrl").identity("url").shared())?;

    r.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn catalogue_builds() {
        let registry = registry().unwrap();
        assert_eq!(registry.labels().count(), 20);
    }

    #[test]
    fn host_definition() {
        let registry = registry().unwrap();
        let host = registry.model("Host").unwrap();
        assert_eq!(host.state_label(), "HostState");
        assert_eq!(host.identity_property(), "hostname_environment");
        assert_eq!(host.identity_concat(), ["hostname", "environment"]);
        assert_eq!(host.static_properties(), ["hostname", "environment"]);
        assert_eq!(host.state_properties().len(), 24);
        assert_eq!(registry.property_kind("Host", "memtotal_mb").unwrap(), Int);
        assert_eq!(registry.property_kind("Host", "selinux").unwrap(), Bool);
        assert_eq!(host.children().len(), 9);
    }

    #[test]
    fn environment_lock_has_no_state() {
        let registry = registry().unwrap();
        let lock = registry.model("EnvironmentLock").unwrap();
        assert!(!lock.has_state());
        assert_eq!(lock.static_properties(), ["account_number", "name", "locked"]);
        assert!(registry.path("EnvironmentLock").is_empty());
    }

    #[test]
    fn shared_models() {
        let registry = registry().unwrap();
        let mut shared: Vec<_> = registry.labels().filter(|l| registry.is_shared(l)).collect();
        shared.sort();
        assert_eq!(
            shared,
            vec![
                "AptPackage",
                "GitUntrackedFile",
                "GitUrl",
                "KernelModuleParameter",
                "NameServer",
                "PythonPackage",
            ]
        );
    }

    #[test]
    fn ancestor_paths() {
        let registry = registry().unwrap();
        let hops = |label: &str| -> Vec<(String, String)> { registry.path(label) };
        assert_eq!(
            hops("AptPackage"),
            vec![
                ("Environment".to_string(), "HAS_HOST".to_string()),
                ("Host".to_string(), "HAS_APT_PACKAGE".to_string()),
            ]
        );
        assert_eq!(
            hops("GitUrl"),
            vec![
                ("Environment".to_string(), "HAS_GIT_REPO".to_string()),
                ("GitRepo".to_string(), "HAS_GIT_REMOTE".to_string()),
                ("GitRemote".to_string(), "HAS_GIT_URL".to_string()),
            ]
        );
        assert_eq!(hops("PythonPackage").len(), 3);
    }

    #[test]
    fn environment_forest_reaches_every_model() {
        let registry = registry().unwrap();
        let paths = registry.paths_from("Environment");
        // Every model except EnvironmentLock is reachable.
        assert_eq!(paths.len(), 19);
        assert_eq!(paths[0], ["Environment"]);
        assert_eq!(paths[1].len(), 2);
    }
}
