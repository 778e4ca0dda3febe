//! `facts_<host>.json`: Ansible facts for each host.
//!
//! The facts give the host's own state plus its name servers, interfaces,
//! mounts and block devices. Every host seen becomes the environment's
//! open host set.

use serde_json::Value;
use strata_core::PropertyValue;
use strata_graph::{Entity, GraphStore};

use super::lookup;
use crate::error::Result;
use crate::run::SyncContext;

/// Host state property and where it lives in the facts.
const FACTS: &[(&str, &[&str])] = &[
    ("architecture", &["ansible_architecture"]),
    ("bios_date", &["ansible_bios_date"]),
    ("bios_version", &["ansible_bios_version"]),
    ("default_ipv4_address", &["ansible_default_ipv4", "address"]),
    ("default_ipv6_address", &["ansible_default_ipv6", "address"]),
    ("kernel", &["ansible_kernel"]),
    ("memtotal_mb", &["ansible_memtotal_mb"]),
    ("lsb_codename", &["ansible_lsb", "codename"]),
    ("lsb_description", &["ansible_lsb", "description"]),
    ("lsb_id", &["ansible_lsb", "id"]),
    ("lsb_major_release", &["ansible_lsb", "major_release"]),
    ("lsb_release", &["ansible_lsb", "release"]),
    ("fqdn", &["ansible_fqdn"]),
    ("pkg_mgr", &["ansible_pkg_mgr"]),
    ("processor_cores", &["ansible_processor_cores"]),
    ("processor_count", &["ansible_processor_count"]),
    ("processor_threads_per_core", &["ansible_processor_threads_per_core"]),
    ("processor_vcpus", &["ansible_processor_vcpus"]),
    ("python_executable", &["ansible_python", "executable"]),
    ("python_version", &["ansible_python_version"]),
    ("python_type", &["ansible_python", "type"]),
    ("service_mgr", &["ansible_service_mgr"]),
    ("ansible_version_full", &["ansible_version", "full"]),
];

pub async fn snitch<S: GraphStore>(ctx: &SyncContext<'_, S>) -> Result<usize> {
    let mut hosts = Vec::new();
    let mut count = 0;

    for (hostname, member) in ctx.run.host_files("facts") {
        let facts = ctx.run.data(&member)?.unwrap_or_default();
        let host = host_entity(ctx, &hostname, &facts)?;
        ctx.graph.update(&host, ctx.time_ms).await?;
        count += 1;

        count += name_servers(ctx, &host, &facts).await?;
        count += interfaces(ctx, &host, &facts).await?;
        count += mounts(ctx, &host, &facts).await?;
        count += devices(ctx, &host, &facts).await?;
        hosts.push(host);
    }

    ctx.graph
        .update_children(ctx.environment(), "hosts", &hosts, ctx.time_ms)
        .await?;
    tracing::debug!(uuid = %ctx.uuid(), hosts = hosts.len(), "Hosts reconciled");
    Ok(count)
}

fn host_entity<'a, S: GraphStore>(
    ctx: &SyncContext<'a, S>,
    hostname: &str,
    facts: &Value,
) -> Result<Entity<'a>> {
    let mut builder = Entity::builder(ctx.model("Host")?)
        .set("hostname", hostname)
        .set("environment", ctx.uuid());
    for (property, path) in FACTS {
        builder = builder.set_json(property, lookup(facts, path));
    }
    if let Some(status) = lookup(facts, &["ansible_selinux", "status"]).and_then(Value::as_str) {
        builder = builder.set("selinux", status == "enabled");
    }
    Ok(builder.build()?)
}

async fn name_servers<S: GraphStore>(
    ctx: &SyncContext<'_, S>,
    host: &Entity<'_>,
    facts: &Value,
) -> Result<usize> {
    let model = ctx.model("NameServer")?;
    let servers = lookup(facts, &["ansible_dns", "nameservers"])
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|ip| Entity::builder(model).set_json("ip", Some(ip)).build())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ctx.reconcile(host, "nameservers", &servers).await?)
}

async fn interfaces<S: GraphStore>(
    ctx: &SyncContext<'_, S>,
    host: &Entity<'_>,
    facts: &Value,
) -> Result<usize> {
    let model = ctx.model("Interface")?;
    let devices = lookup(facts, &["ansible_interfaces"])
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);

    let mut interfaces = Vec::new();
    for device in devices {
        let key = format!("ansible_{}", device.replace(|c: char| c == '-' || c == '.', "_"));
        let detail = facts.get(&key).cloned().unwrap_or_default();
        let ipv6 = lookup(&detail, &["ipv6"])
            .and_then(Value::as_array)
            .and_then(|addrs| addrs.first())
            .and_then(|addr| addr.get("address"));
        interfaces.push(
            Entity::builder(model)
                .set("device", device)
                .set("host", host.identity().clone())
                .set_json("active", detail.get("active"))
                .set_json("ipv4_address", lookup(&detail, &["ipv4", "address"]))
                .set_json("ipv6_address", ipv6)
                .set_json("macaddress", detail.get("macaddress"))
                .set_json("mtu", detail.get("mtu"))
                .set_json("promisc", detail.get("promisc"))
                .set_json("type", detail.get("type"))
                .build()?,
        );
    }
    Ok(ctx.reconcile(host, "interfaces", &interfaces).await?)
}

async fn mounts<S: GraphStore>(
    ctx: &SyncContext<'_, S>,
    host: &Entity<'_>,
    facts: &Value,
) -> Result<usize> {
    let model = ctx.model("Mount")?;
    let mounts = lookup(facts, &["ansible_mounts"])
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|m| {
            Entity::builder(model)
                .set_json("mount", m.get("mount"))
                .set("host", host.identity().clone())
                .set_json("device", m.get("device"))
                .set_json("size_total", m.get("size_total"))
                .set_json("fstype", m.get("fstype"))
                .build()
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ctx.reconcile(host, "mounts", &mounts).await?)
}

async fn devices<S: GraphStore>(
    ctx: &SyncContext<'_, S>,
    host: &Entity<'_>,
    facts: &Value,
) -> Result<usize> {
    let device_model = ctx.model("Device")?;
    let partition_model = ctx.model("Partition")?;

    let mut devices = Vec::new();
    let mut partitions = Vec::new();
    for (name, detail) in lookup(facts, &["ansible_devices"])
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
    {
        let device = Entity::builder(device_model)
            .set("name", name.as_str())
            .set("host", host.identity().clone())
            .set_json("removable", detail.get("removable"))
            .set_json("rotational", detail.get("rotational"))
            .set_json("size", detail.get("size"))
            .build()?;
        let device_id: PropertyValue = device.identity().clone();
        partitions.push(
            detail
                .get("partitions")
                .and_then(Value::as_object)
                .into_iter()
                .flatten()
                .map(|(part, p)| {
                    Entity::builder(partition_model)
                        .set("name", part.as_str())
                        .set("device", device_id.clone())
                        .set_json("size", p.get("size"))
                        .set_json("start", p.get("start"))
                        .build()
                })
                .collect::<std::result::Result<Vec<_>, _>>()?,
        );
        devices.push(device);
    }

    let mut count = ctx.reconcile(host, "devices", &devices).await?;
    for (device, parts) in devices.iter().zip(&partitions) {
        count += ctx.reconcile(device, "partitions", parts).await?;
    }
    Ok(count)
}
