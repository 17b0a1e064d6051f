use std::io::Write;

use tracing::debug;

use crate::device::Device;
use crate::error::AdbError;

/// Run `shell:<command>` on the device, reading stdout until the device
/// closes the stream. With `echo_output` each chunk is printed as it
/// arrives; the full output is returned either way.
pub async fn run(
    device: &mut Device,
    command: &str,
    echo_output: bool,
) -> Result<String, AdbError> {
    let destination = format!("shell:{}", command);
    let mut session = device.open_stream(&destination).await?;

    let mut output = Vec::new();
    loop {
        match session.read().await {
            Ok(chunk) => {
                if echo_output {
                    let mut stdout = std::io::stdout();
                    let _ = stdout.write_all(&chunk);
                    let _ = stdout.flush();
                }
                output.extend_from_slice(&chunk);
            }
            Err(AdbError::StreamClosed) => break,
            Err(e) => {
                let _ = session.close().await;
                return Err(e);
            }
        }
    }
    session.close().await?;

    debug!("shell {:?} produced {} bytes", command, output.len());
    Ok(String::from_utf8_lossy(&output).into_owned())
}

/// Quote an argument for the device shell.
pub fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_path() {
        assert_eq!(quote("/data/local/tmp"), "'/data/local/tmp'");
    }

    #[test]
    fn test_quote_embedded_quote() {
        assert_eq!(quote("it's"), "'it'\\''s'");
    }
}
