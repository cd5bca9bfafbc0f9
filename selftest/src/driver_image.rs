use anyhow::{format_err, Result};
use std::process::Command;
use tempfile::TempDir;

/// Builds a stand-in driver image with `docker`: a busybox image whose `go`
/// binary streams a few test-runner-shaped lines and exits successfully.
/// Load it into a kind cluster to exercise the full happy path without the
/// real e2e image.
pub fn build_stub_driver_image(tag: &str) -> Result<()> {
    let context = TempDir::new()?;
    std::fs::write(
        context.path().join("go"),
        "#!/bin/sh\necho '=== RUN smoke'\necho '--- PASS: smoke'\necho 'PASS'\nexit 0\n",
    )?;
    std::fs::write(
        context.path().join("Dockerfile"),
        "FROM busybox\nCOPY go /usr/local/bin/go\nRUN chmod +x /usr/local/bin/go\n",
    )?;
    let output = Command::new("docker")
        .arg("build")
        .arg("--tag")
        .arg(tag)
        .arg(context.path())
        .output()?;
    if !output.status.success() {
        return Err(format_err!(
            "'docker build' failed with exit status '{}'\n\n{}\n\n{}",
            output.status.code().unwrap_or(1),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        ));
    }
    Ok(())
}
