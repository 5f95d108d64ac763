//! Helpers shared by the integration tests: stub executables written as
//! shell scripts into a temp directory.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `#!/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write stub script");
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Stub speech engine: writes its `--out_path`, prints `AUDIO` to stdout,
/// logs to stderr and exits with `code`.
pub fn stub_engine(dir: &Path, code: i32) -> PathBuf {
    let body = format!(
        r#"out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out_path) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf 'RIFF' > "$out"
printf 'AUDIO'
echo " > Processing time: 0.1" >&2
exit {}"#,
        code
    );
    write_script(dir, "tts", &body)
}
