//! Shared data types for the FTPS client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Security / transfer mode ────────────────────────────────────────

/// Security protocol requested for the control channel.
///
/// Only the TLS 1.2/1.3 variants can actually be negotiated by this crate's
/// `rustls`-based connector; the legacy variants exist for API
/// compatibility with configuration sources that still name them and are
/// rejected explicitly rather than silently downgraded (see `tls.rs`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SecurityProtocol {
    None,
    Ssl2Explicit,
    Ssl3Explicit,
    Tls1Explicit,
    Tls1OrSsl3Explicit,
    Ssl2Implicit,
    Ssl3Implicit,
    Tls1Implicit,
    Tls1OrSsl3Implicit,
    Tls11Explicit,
    Tls11Implicit,
    Tls12Explicit,
    Tls12Implicit,
}

impl Default for SecurityProtocol {
    fn default() -> Self {
        Self::None
    }
}

impl SecurityProtocol {
    /// Whether the TLS handshake happens before the greeting (implicit)
    /// or after an explicit `AUTH` exchange.
    pub fn is_implicit(self) -> bool {
        matches!(
            self,
            Self::Ssl2Implicit
                | Self::Ssl3Implicit
                | Self::Tls1Implicit
                | Self::Tls1OrSsl3Implicit
                | Self::Tls11Implicit
                | Self::Tls12Implicit
        )
    }

    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Whether `rustls` can actually negotiate this protocol.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::None | Self::Tls12Explicit | Self::Tls12Implicit)
    }
}

/// Transfer type (RFC 959 `TYPE` command).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Ascii,
    Binary,
    Ebcdic,
}

impl Default for DataType {
    fn default() -> Self {
        Self::Binary
    }
}

/// Caller's preferred data-channel negotiation; the engine falls back per
/// the chain documented in `transfer.rs` unless `allow_fallback` is unset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferMode {
    Active,
    Passive,
    ExtendedPassive,
}

impl Default for TransferMode {
    fn default() -> Self {
        Self::ExtendedPassive
    }
}

/// `MODE Z` compression state of the control channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CompressionState {
    Off,
    ZlibOn,
}

impl Default for CompressionState {
    fn default() -> Self {
        Self::Off
    }
}

impl CompressionState {
    pub fn is_on(&self) -> bool {
        matches!(self, Self::ZlibOn)
    }
}

// ─── Connection configuration ────────────────────────────────────────

/// Configuration for a single FTP connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub account: Option<String>,
    #[serde(default)]
    pub security: SecurityProtocol,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub transfer_mode: TransferMode,
    /// Permit EPSV→PASV→PORT / EPRT→PORT→PASV fallback on negotiation failure.
    #[serde(default = "default_true")]
    pub allow_data_mode_fallback: bool,
    /// Initial remote directory to CWD into after login.
    #[serde(default)]
    pub initial_directory: Option<String>,
    /// Connection (TCP + TLS + proxy) timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_sec: u64,
    /// Per-command timeout in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_sec: u64,
    /// Per-chunk data-channel timeout in seconds.
    #[serde(default = "default_data_timeout")]
    pub data_timeout_sec: u64,
    /// Seconds of control-channel idle time before `keepalive_if_due`
    /// sends a `NOOP` (0 = disabled). Not enforced automatically; the
    /// caller must poll `keepalive_if_due` during an otherwise-idle period.
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_sec: u64,
    /// Accept any server certificate unconditionally. Off by default; see
    /// `CertificateValidator` in `tls.rs` for the non-bypass path.
    #[serde(default)]
    pub always_accept_server_certificate: bool,
    /// UTF-8 encoding (`OPTS UTF8 ON`).
    #[serde(default = "default_true")]
    pub utf8: bool,
    /// Local address to bind for active-mode data connections.
    #[serde(default)]
    pub active_bind_address: Option<String>,
    /// Chunk size for the transfer loop (bytes).
    #[serde(default = "default_chunk")]
    pub copy_buffer_size: usize,
    /// Transport adapter selection (direct connect or a proxy).
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Friendly label for the connection (diagnostics only).
    #[serde(default)]
    pub label: Option<String>,
}

fn default_connect_timeout() -> u64 {
    15
}
fn default_command_timeout() -> u64 {
    30
}
fn default_data_timeout() -> u64 {
    30
}
fn default_keepalive() -> u64 {
    60
}
fn default_chunk() -> usize {
    4096
}
fn default_true() -> bool {
    true
}

impl Default for FtpConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 21,
            username: "anonymous".into(),
            password: "anonymous@".into(),
            account: None,
            security: SecurityProtocol::None,
            data_type: DataType::Binary,
            transfer_mode: TransferMode::ExtendedPassive,
            allow_data_mode_fallback: true,
            initial_directory: None,
            connect_timeout_sec: default_connect_timeout(),
            command_timeout_sec: default_command_timeout(),
            data_timeout_sec: default_data_timeout(),
            keepalive_interval_sec: default_keepalive(),
            always_accept_server_certificate: false,
            utf8: true,
            active_bind_address: None,
            copy_buffer_size: default_chunk(),
            proxy: ProxyConfig::default(),
            label: None,
        }
    }
}

/// Which `TransportAdapter` the client should construct.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ProxyConfig {
    #[default]
    Direct,
    HttpConnect {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    },
    Socks4 {
        host: String,
        port: u16,
        user_id: Option<String>,
    },
    Socks5 {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    },
}

// ─── Control-channel response / request ──────────────────────────────

/// Response group, derived from the hundreds digit of the reply code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ResponseGroup {
    PositivePreliminary,
    PositiveCompletion,
    PositiveIntermediate,
    TransientNegativeCompletion,
    PermanentNegativeCompletion,
}

impl ResponseGroup {
    pub fn from_code(code: u16) -> Self {
        match code / 100 {
            1 => Self::PositivePreliminary,
            2 => Self::PositiveCompletion,
            3 => Self::PositiveIntermediate,
            4 => Self::TransientNegativeCompletion,
            _ => Self::PermanentNegativeCompletion,
        }
    }
}

/// A single FTP response, possibly multi-line. `code: None` is the
/// sentinel for "never received" (e.g. connection dropped mid-read).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub code: Option<u16>,
    pub group: Option<ResponseGroup>,
    pub text: String,
    pub raw: String,
}

impl Response {
    pub fn new(code: u16, text: String, raw: String) -> Self {
        Self {
            code: Some(code),
            group: Some(ResponseGroup::from_code(code)),
            text,
            raw,
        }
    }

    pub fn none() -> Self {
        Self {
            code: None,
            group: None,
            text: String::new(),
            raw: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.code, Some(c) if c < 400)
    }

    pub fn is_preliminary(&self) -> bool {
        matches!(self.group, Some(ResponseGroup::PositivePreliminary))
    }
}

/// A command sent on the control channel. `redacted` is set for `PASS` so
/// observers never see the real password in `RequestSent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub verb: String,
    pub arguments: Option<String>,
    pub redacted: bool,
}

impl Request {
    pub fn new(verb: impl Into<String>, arguments: Option<String>) -> Self {
        let verb = verb.into();
        let redacted = verb.eq_ignore_ascii_case("PASS");
        Self {
            verb,
            arguments,
            redacted,
        }
    }

    /// Text suitable for logs/events: the real argument unless redacted.
    pub fn display_line(&self) -> String {
        let arg = if self.redacted {
            "***"
        } else {
            self.arguments.as_deref().unwrap_or("")
        };
        if arg.is_empty() {
            self.verb.clone()
        } else {
            format!("{} {}", self.verb, arg)
        }
    }
}

// ─── Server capabilities ─────────────────────────────────────────────

/// Parsed `FEAT` response: feature name → optional argument list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub features: HashMap<String, Vec<String>>,
    pub raw: Vec<String>,
}

impl FeatureSet {
    pub fn supports(&self, name: &str) -> bool {
        self.features.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    pub fn mlsd(&self) -> bool {
        self.supports("MLSD")
    }
    pub fn mlst(&self) -> bool {
        self.supports("MLST")
    }
    pub fn epsv(&self) -> bool {
        self.supports("EPSV")
    }
    pub fn eprt(&self) -> bool {
        self.supports("EPRT")
    }
    pub fn auth_tls(&self) -> bool {
        self.supports("AUTH")
    }
    pub fn utf8(&self) -> bool {
        self.supports("UTF8")
    }
    pub fn mfmt(&self) -> bool {
        self.supports("MFMT")
    }

    /// Best available integrity hash per the SHA256 > SHA1 > MD5 > CRC
    /// selection order, drawn from `XCRC`/`XMD5`/`XSHA1`/`XSHA256`/`HASH`.
    pub fn best_hash_algorithm(&self) -> Option<HashAlgorithm> {
        if self.supports("HASH") || self.supports("XSHA256") {
            Some(HashAlgorithm::Sha256)
        } else if self.supports("XSHA1") {
            Some(HashAlgorithm::Sha1)
        } else if self.supports("XMD5") {
            Some(HashAlgorithm::Md5)
        } else if self.supports("XCRC") {
            Some(HashAlgorithm::Crc32)
        } else {
            None
        }
    }
}

/// Integrity hash algorithms this crate can compute and compare.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HashAlgorithm {
    Crc32,
    Md5,
    Sha1,
    Sha256,
}

// ─── Directory listing ───────────────────────────────────────────────

/// Kind of a remote filesystem entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// Fields shared by every listing format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryCommon {
    pub name: String,
    pub parent_path: Option<String>,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub kind: EntryKind,
    pub raw: String,
}

/// A `LIST`-output entry in `ls -l` (UNIX) form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnixEntry {
    pub common: EntryCommon,
    pub permissions: String,
    pub link_count: u32,
    pub owner: String,
    pub group: String,
    pub link_target: Option<String>,
}

/// A `LIST`-output entry in Windows/DOS `dir`-style form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosEntry {
    pub common: EntryCommon,
}

/// Whether an MLSx `type=` fact denotes the directory itself, its parent,
/// or a regular child entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MlsxTypeSentinel {
    Entry,
    CurrentDir,
    ParentDir,
}

/// A `MLSD`/`MLST` entry (RFC 3659).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MlsxEntry {
    pub common: EntryCommon,
    pub sentinel: MlsxTypeSentinel,
    pub facts: HashMap<String, String>,
}

/// Tagged directory entry: a parser always knows which format it is
/// parsing, so callers receive the matching variant rather than a single
/// flattened shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "format")]
pub enum DirectoryEntry {
    Unix(UnixEntry),
    Dos(DosEntry),
    Mlsx(MlsxEntry),
}

impl DirectoryEntry {
    pub fn common(&self) -> &EntryCommon {
        match self {
            Self::Unix(e) => &e.common,
            Self::Dos(e) => &e.common,
            Self::Mlsx(e) => &e.common,
        }
    }

    pub fn name(&self) -> &str {
        &self.common().name
    }

    pub fn kind(&self) -> EntryKind {
        self.common().kind
    }
}

/// A per-line listing parse failure; the overall listing still returns
/// whatever entries parsed successfully alongside these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingParseError {
    pub line: String,
    pub message: String,
}

/// How the caller wants `get_dir_list` to choose its listing method.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ListingMethod {
    #[default]
    Automatic,
    Mlsd,
    ListExtended,
    List,
}

/// Result of a directory listing: parsed entries plus any per-line
/// failures, per spec's "per-entry parse failure" policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub entries: Vec<DirectoryEntry>,
    pub errors: Vec<ListingParseError>,
}

// ─── Transfer ────────────────────────────────────────────────────────

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// `put()` action, mirroring RFC 959 storage semantics plus resume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PutAction {
    Create,
    CreateNew,
    CreateOrAppend,
    Resume,
    ResumeOrCreate,
}

/// Live progress snapshot for a single transfer, emitted at chunk
/// boundaries. `transfer_size` is `None` when unknown to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub direction: TransferDirection,
    pub bytes_in_last_chunk: u64,
    pub total_bytes: u64,
    pub transfer_size: Option<u64>,
    pub bytes_per_second: f64,
    pub elapsed_ms: u64,
    pub percent_complete: Option<f32>,
}

impl TransferProgress {
    pub fn bytes_remaining(&self) -> Option<u64> {
        self.transfer_size
            .map(|size| size.saturating_sub(self.total_bytes))
    }
}

// ─── Diagnostics ──────────────────────────────────────────────────────

/// Diagnostics snapshot of the control channel, exposed for logging/UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpDiagnostics {
    pub host: String,
    pub port: u16,
    pub security: SecurityProtocol,
    pub features: FeatureSet,
    pub current_directory: String,
    pub system_type: Option<String>,
    pub compression: CompressionState,
    pub latency_ms: Option<u64>,
    pub last_response_code: Option<u16>,
}
