use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use conductor_domain::MacAddress;
use tracing::debug;
use uuid::Uuid;

/// Per-node directory under the TFTP root: `{tftp_root}/{node_uuid}/`.
pub fn node_dir(root: &Path, node_uuid: Uuid) -> PathBuf {
    root.join(node_uuid.to_string())
}

/// The boot config file a node's PXE symlinks resolve to (spec.md §6).
pub fn boot_config_path(root: &Path, node_uuid: Uuid) -> PathBuf {
    node_dir(root, node_uuid).join("config")
}

/// The per-MAC pxelinux symlink, named the way syslinux looks it up:
/// `01-{mac-with-dashes}` under `pxelinux.cfg/`.
pub fn pxe_symlink_path(root: &Path, mac: &MacAddress) -> PathBuf {
    let dashed = mac.as_str().replace(':', "-");
    root.join("pxelinux.cfg").join(format!("01-{dashed}"))
}

/// The deploy token file a node's agent heartbeat proves possession of.
pub fn token_path(root: &Path, node_uuid: Uuid) -> PathBuf {
    root.join(format!("token-{node_uuid}"))
}

/// Writes a node's boot config and deploy token, and links every MAC in
/// `macs` to it. Replaces any symlink already at a MAC's path (re-deploys
/// reuse the same MAC set against fresh contents).
pub fn write_boot_config(
    root: &Path,
    node_uuid: Uuid,
    macs: &[MacAddress],
    contents: &str,
    token: &str,
) -> io::Result<()> {
    let dir = node_dir(root, node_uuid);
    fs::create_dir_all(&dir)?;
    let config_path = boot_config_path(root, node_uuid);
    fs::write(&config_path, contents)?;

    let cfg_dir = root.join("pxelinux.cfg");
    fs::create_dir_all(&cfg_dir)?;
    for mac in macs {
        let link = pxe_symlink_path(root, mac);
        ignore_not_found(fs::remove_file(&link))?;
        symlink(&config_path, &link)?;
    }

    fs::write(token_path(root, node_uuid), token)?;
    debug!(node = %node_uuid, macs = macs.len(), "wrote tftp boot config");
    Ok(())
}

/// Removes a node's boot config directory, its deploy token, and every
/// per-MAC symlink that pointed into it. Idempotent: a layout that's
/// already partially or fully gone is not an error (spec.md §8 — deletion
/// must leave no TFTP artifacts behind, including on repeated deletes).
pub fn clean_up(root: &Path, node_uuid: Uuid, macs: &[MacAddress]) -> io::Result<()> {
    for mac in macs {
        ignore_not_found(fs::remove_file(pxe_symlink_path(root, mac)))?;
    }
    ignore_not_found(fs::remove_file(token_path(root, node_uuid)))?;
    ignore_not_found(fs::remove_dir_all(node_dir(root, node_uuid)))?;
    debug!(node = %node_uuid, macs = macs.len(), "cleaned up tftp layout");
    Ok(())
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    fs::copy(original, link).map(|_| ())
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    #[test]
    fn write_then_clean_up_removes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let node_uuid = Uuid::new_v4();
        let macs = vec![mac("AA:BB:CC:DD:EE:FF"), mac("11:22:33:44:55:66")];

        write_boot_config(root, node_uuid, &macs, "boot config body", "tok-123").unwrap();

        assert!(boot_config_path(root, node_uuid).exists());
        assert!(token_path(root, node_uuid).exists());
        for m in &macs {
            assert!(pxe_symlink_path(root, m).symlink_metadata().is_ok());
        }

        clean_up(root, node_uuid, &macs).unwrap();

        assert!(!node_dir(root, node_uuid).exists());
        assert!(!token_path(root, node_uuid).exists());
        for m in &macs {
            assert!(pxe_symlink_path(root, m).symlink_metadata().is_err());
        }
    }

    #[test]
    fn clean_up_on_nonexistent_layout_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let node_uuid = Uuid::new_v4();
        let macs = vec![mac("AA:BB:CC:DD:EE:FF")];

        clean_up(root, node_uuid, &macs).unwrap();
        clean_up(root, node_uuid, &macs).unwrap();
    }

    #[test]
    fn pxe_symlink_path_dashes_the_mac() {
        let root = Path::new("/tftpboot");
        let path = pxe_symlink_path(root, &mac("aa:bb:cc:dd:ee:ff"));
        assert_eq!(path, root.join("pxelinux.cfg").join("01-aa-bb-cc-dd-ee-ff"));
    }

    #[test]
    fn redeploy_replaces_existing_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let node_uuid = Uuid::new_v4();
        let macs = vec![mac("AA:BB:CC:DD:EE:FF")];

        write_boot_config(root, node_uuid, &macs, "first", "tok-1").unwrap();
        write_boot_config(root, node_uuid, &macs, "second", "tok-2").unwrap();

        let contents = fs::read_to_string(boot_config_path(root, node_uuid)).unwrap();
        assert_eq!(contents, "second");
    }
}
