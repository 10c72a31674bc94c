//! Fake scanner executables for tests

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

/// Script body that echoes every argument back as `<args><arg>..</arg></args>`
pub(crate) const ARGS_AS_XML: &str = r#"printf '<args>'
for a in "$@"; do printf '<arg>%s</arg>' "$a"; done
printf '</args>\n'"#;

/// Write an executable `/bin/sh` script into a fresh temp dir.
///
/// Keep the returned `TempDir` alive for as long as the script is used.
pub(crate) fn fake_scanner(body: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("fake-nmap");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write fake scanner");

    let mut perms = fs::metadata(&path).expect("stat fake scanner").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod fake scanner");

    (dir, path)
}

/// True if `pid` exists and is not a zombie
pub(crate) fn process_alive(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // Field after the parenthesised command name is the state
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}
