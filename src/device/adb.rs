//! Thin adb process helpers. Failures whose stderr points at a dead or
//! busy transport are classified transient so the call wrapper can retry
//! them; everything else is fatal.

use std::process::Stdio;

use tokio::process::Command;

use crate::error::EngineError;

/// A connected Android device as reported by `adb devices`.
#[derive(Debug, Clone)]
pub struct Device {
    pub serial: String,
    pub state: String,
}

fn adb_path() -> String {
    std::env::var("ADB_PATH").unwrap_or_else(|_| "adb".to_string())
}

fn classify(stderr: &str, context: &str) -> EngineError {
    let transient_markers = [
        "device offline",
        "device still authorizing",
        "connection reset",
        "closed",
        "protocol fault",
    ];
    if transient_markers.iter().any(|m| stderr.contains(m)) {
        EngineError::transient(format!("{}: {}", context, stderr.trim()))
    } else {
        EngineError::fatal(format!("{}: {}", context, stderr.trim()))
    }
}

async fn run(args: &[&str], context: &str) -> Result<std::process::Output, EngineError> {
    Command::new(adb_path())
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| EngineError::fatal(format!("failed to spawn adb ({}): {}", context, e)))
}

/// Get list of connected Android devices
pub async fn get_devices() -> Result<Vec<Device>, EngineError> {
    let output = run(&["devices"], "adb devices").await?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut devices = Vec::new();
    for line in stdout.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            devices.push(Device {
                serial: parts[0].to_string(),
                state: parts[1].to_string(),
            });
        }
    }
    Ok(devices)
}

/// Execute an ADB shell command
pub async fn shell(serial: Option<&str>, cmd: &str) -> Result<String, EngineError> {
    let mut args = Vec::new();
    if let Some(s) = serial {
        args.push("-s");
        args.push(s);
    }
    args.push("shell");
    args.push(cmd);

    let output = run(&args, cmd).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(classify(&stderr, &format!("adb shell {}", cmd)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Execute a raw ADB command (e.g. pull)
pub async fn exec(serial: Option<&str>, args: &[&str]) -> Result<String, EngineError> {
    let mut full_args = Vec::new();
    if let Some(s) = serial {
        full_args.push("-s");
        full_args.push(s);
    }
    full_args.extend_from_slice(args);

    let output = run(&full_args, &args.join(" ")).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(classify(&stderr, &format!("adb {}", args.join(" "))));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Execute ADB exec-out command (avoids file I/O on device for text dumps)
pub async fn exec_out(serial: Option<&str>, cmd: &str) -> Result<String, EngineError> {
    let mut args = Vec::new();
    if let Some(s) = serial {
        args.push("-s");
        args.push(s);
    }
    args.push("exec-out");
    args.push(cmd);

    let output = run(&args, cmd).await?;
    // exec-out does not always set an exit status, so judge by output
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stdout.is_empty() && !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(classify(&stderr, &format!("adb exec-out {}", cmd)));
    }
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_classified_transient() {
        assert!(classify("error: device offline", "adb shell input tap").is_transient());
        assert!(classify("error: closed", "adb shell").is_transient());
        assert!(!classify("error: unknown command", "adb shell").is_transient());
    }
}
