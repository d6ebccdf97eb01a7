/// Connection lifecycle for each transport client (§4.1).
///
/// Reconnect is lazy and demand-driven: only `ensure_connected` (called from
/// `transcribe`/`translate`/`synthesize`) ever moves a client out of
/// `Disconnected`. There is deliberately no background task that reconnects
/// on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Draining,
}
