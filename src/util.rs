use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub fn setup_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true) // Show thread IDs
                .with_thread_names(true) // Show thread names
                .with_target(true) // Show module path
                .with_file(true) // Show file name
                .with_line_number(true) // Show line numbers
                .pretty(),
        )
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(level))?
                .add_directive("tokio=info".parse()?),
        )
        .try_init()?;
    Ok(())
}

/// Decodes a NUL padded MAVLink char array.
pub fn text_from_bytes(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Encodes a string into a NUL padded MAVLink char array, truncating if needed.
pub fn bytes_from_text<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = text.len().min(N);
    out[..len].copy_from_slice(&text.as_bytes()[..len]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_stops_at_nul() {
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(b"CAL_MAG0");
        assert_eq!(text_from_bytes(&raw), "CAL_MAG0");
        assert_eq!(text_from_bytes(b"FULL"), "FULL");
    }

    #[test]
    fn param_id_roundtrip_truncates() {
        let id: [u8; 16] = bytes_from_text("COM_POSCTL_NAVL");
        assert_eq!(text_from_bytes(&id), "COM_POSCTL_NAVL");
        let long: [u8; 4] = bytes_from_text("MIS_TAKEOFF_ALT");
        assert_eq!(&long, b"MIS_");
    }
}
