//! High-level client façade (spec.md §4.4): composes the control channel,
//! data channel factory, and listing parsers into the user-facing API.
//!
//! A `FtpClient` is a single-threaded, blocking actor (spec.md §5): every
//! public operation runs to completion before returning, and a `Busy`
//! guard rejects a re-entrant call into the same instance rather than
//! letting two operations interleave on one control channel.

use crate::cancel::CancellationHandle;
use crate::error::{FtpError, FtpResult};
use crate::events::{FtpEvent, FtpObserver, ObserverRegistry};
use crate::parser;
use crate::protocol::FtpCodec;
use crate::proxy;
use crate::tls::{self, CertificateValidator, DefaultCertificateValidator};
use crate::transfer::{self, DataChannelOptions, DataStream};
use crate::{connection, types::*};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;

/// An active FTP/FTPS session. Not `Clone`: a session owns exactly one
/// control-channel socket.
pub struct FtpClient {
    pub(crate) codec: FtpCodec,
    pub(crate) config: FtpConnectionConfig,
    pub(crate) features: FeatureSet,
    pub(crate) control_peer_ip: IpAddr,
    pub(crate) current_directory: String,
    pub(crate) system_type: Option<String>,
    pub(crate) compression: CompressionState,
    pub(crate) cancellation: CancellationHandle,
    pub(crate) observers: ObserverRegistry,
    pub(crate) validator: Arc<dyn CertificateValidator>,
    pub(crate) prot_p: bool,
    connected: bool,
    busy: AtomicBool,
    last_response_code: Option<u16>,
    last_latency_ms: Option<u64>,
    last_activity: Instant,
}

impl FtpClient {
    // ─── Connection lifecycle ───────────────────────────────────────

    /// Connect and log in using the default (WebPKI-only) certificate
    /// validator.
    pub async fn connect(config: FtpConnectionConfig) -> FtpResult<Self> {
        Self::connect_with(config, Arc::new(DefaultCertificateValidator)).await
    }

    /// Connect and log in, with a caller-supplied certificate validation
    /// hook (spec.md §6 `ValidateServerCertificate`).
    pub async fn connect_with(
        config: FtpConnectionConfig,
        validator: Arc<dyn CertificateValidator>,
    ) -> FtpResult<Self> {
        tls::ensure_supported(config.security)?;

        let adapter = proxy::adapter_for(&config.proxy);
        let (mut codec, banner, control_peer_ip) =
            connection::connect(&config, adapter.as_ref(), validator.clone()).await?;

        if !banner.is_success() {
            return Err(FtpError::protocol(
                format!("unexpected greeting: {}", banner.text),
                Some(banner),
            ));
        }

        let mut prot_p = config.security.is_implicit();

        if !config.security.is_none() && !config.security.is_implicit() {
            let budget = Duration::from_secs(config.command_timeout_sec);
            let resp = tokio::time::timeout(budget, codec.execute("AUTH", Some("TLS")))
                .await
                .map_err(|_| FtpError::connection("timed out waiting for a response to AUTH TLS"))??;
            if !resp.is_success() {
                return Err(FtpError::auth(
                    format!("AUTH TLS rejected: {}", resp.text),
                    Some(resp),
                ));
            }
            codec = tls::upgrade_to_tls(
                codec,
                &config.host,
                validator.clone(),
                config.always_accept_server_certificate,
            )
            .await?;
            prot_p = true;
        }

        let mut client = Self {
            codec,
            config,
            features: FeatureSet::default(),
            control_peer_ip,
            current_directory: String::from("/"),
            system_type: None,
            compression: CompressionState::Off,
            cancellation: CancellationHandle::new(),
            observers: ObserverRegistry::default(),
            validator,
            prot_p,
            connected: true,
            busy: AtomicBool::new(false),
            last_response_code: banner.code,
            last_latency_ms: None,
            last_activity: Instant::now(),
        };

        if prot_p {
            let resp = client.exec("PBSZ", Some("0")).await?;
            if !resp.is_success() {
                return Err(FtpError::auth(
                    format!("PBSZ rejected: {}", resp.text),
                    Some(resp),
                ));
            }
            let resp = client.exec("PROT", Some("P")).await?;
            if !resp.is_success() {
                return Err(FtpError::auth(
                    format!("PROT P rejected: {}", resp.text),
                    Some(resp),
                ));
            }
        }

        let user = client.config.username.clone();
        let pass = client.config.password.clone();
        let account = client.config.account.clone();
        client.login(&user, &pass, account.as_deref()).await?;

        client.features = client.probe_features().await?;

        if client.config.utf8 && client.features.utf8() {
            client.exec("OPTS", Some("UTF8 ON")).await?;
        }

        if let Ok(resp) = client.exec("SYST", None).await {
            if resp.is_success() {
                client.system_type = Some(resp.text.trim().to_string());
            }
        }

        let data_type = client.config.data_type;
        client.set_type(data_type).await?;

        if let Ok(Some(pwd)) = client.refresh_pwd().await {
            client.current_directory = pwd;
        }

        let initial = client.config.initial_directory.clone();
        if let Some(dir) = initial {
            client.change_directory_multi_path(&dir).await?;
        }

        client.touch();
        Ok(client)
    }

    async fn login(&mut self, user: &str, pass: &str, account: Option<&str>) -> FtpResult<()> {
        let resp = self.exec("USER", Some(user)).await?;
        match resp.code {
            Some(230) => return Ok(()),
            Some(331) => {}
            _ => return Err(FtpError::auth(resp.text.clone(), Some(resp))),
        }

        let resp = self.exec("PASS", Some(pass)).await?;
        match resp.code {
            Some(230) => Ok(()),
            Some(332) => {
                let acct = account.ok_or_else(|| {
                    FtpError::auth(
                        "server requires ACCT but none was configured",
                        Some(resp.clone()),
                    )
                })?;
                let resp = self.exec("ACCT", Some(acct)).await?;
                if resp.code == Some(230) {
                    Ok(())
                } else {
                    Err(FtpError::auth(resp.text.clone(), Some(resp)))
                }
            }
            _ => Err(FtpError::auth(resp.text.clone(), Some(resp))),
        }
    }

    /// Log out (`QUIT`) and mark the session closed. The error is still
    /// returned if the remote already dropped the connection.
    pub async fn quit(&mut self) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.exec("QUIT", None).await;
        self.connected = false;
        self.observers.emit(FtpEvent::ConnectionClosed);
        self.exit_busy();
        result.map(|_| ())
    }

    /// Alias for `quit`, matching the façade vocabulary of spec.md §4.4.
    pub async fn close(&mut self) -> FtpResult<()> {
        self.quit().await
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn diagnostics(&self) -> FtpDiagnostics {
        FtpDiagnostics {
            host: self.config.host.clone(),
            port: self.config.port,
            security: self.config.security,
            features: self.features.clone(),
            current_directory: self.current_directory.clone(),
            system_type: self.system_type.clone(),
            compression: self.compression,
            latency_ms: self.last_latency_ms,
            last_response_code: self.last_response_code,
        }
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn register_observer(&mut self, observer: Arc<dyn FtpObserver>) {
        self.observers.register(observer);
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Send a `NOOP` if the control channel has been idle for at least
    /// `keepalive_interval_sec` (0 disables this), returning whether it did.
    /// `FtpClient` never spawns background tasks (spec.md §1/§5's
    /// single-threaded blocking-actor model), so keeping the control
    /// connection alive during a long caller-side pause is the caller's
    /// responsibility — call this between operations, e.g. from a polling
    /// loop, rather than relying on a timer owned by the client itself.
    pub async fn keepalive_if_due(&mut self) -> FtpResult<bool> {
        if self.config.keepalive_interval_sec == 0 {
            return Ok(false);
        }
        if self.idle_duration() < Duration::from_secs(self.config.keepalive_interval_sec) {
            return Ok(false);
        }
        self.exec("NOOP", None).await?;
        Ok(true)
    }

    // ─── Reentrancy guard (spec.md §5 `Busy`) ───────────────────────

    pub(crate) fn enter_busy(&self) -> FtpResult<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            Err(FtpError::Busy)
        } else {
            Ok(())
        }
    }

    pub(crate) fn exit_busy(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    // ─── Control-channel exchange with event emission ───────────────

    /// Send a command and read its response, firing `RequestSent` and
    /// `ResponseReceived` for registered observers. All façade operations
    /// funnel through here rather than `self.codec` directly so the event
    /// stream (spec.md §6) stays complete. The whole exchange is bounded by
    /// `command_timeout_sec` (spec.md §5's `command_timeout` timer) so a
    /// server that stops responding mid-exchange can't block the client
    /// forever.
    pub(crate) async fn exec(&mut self, verb: &str, args: Option<&str>) -> FtpResult<Response> {
        let started = Instant::now();
        let budget = Duration::from_secs(self.config.command_timeout_sec);

        let request = tokio::time::timeout(budget, self.codec.send(verb, args))
            .await
            .map_err(|_| FtpError::connection(format!("timed out sending {verb}")))??;
        self.observers.emit(FtpEvent::RequestSent(&request));

        let response = tokio::time::timeout(budget, self.codec.read_response())
            .await
            .map_err(|_| FtpError::connection(format!("timed out waiting for a response to {verb}")))??;
        self.observers.emit(FtpEvent::ResponseReceived(&response));

        self.last_response_code = response.code;
        self.last_latency_ms = Some(started.elapsed().as_millis() as u64);
        self.touch();
        Ok(response)
    }

    pub async fn no_operation(&mut self) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.exec("NOOP", None).await;
        self.exit_busy();
        result.and_then(|resp| {
            if resp.is_success() {
                Ok(())
            } else {
                Err(FtpError::from_response(&resp))
            }
        })
    }

    /// Send `ABOR` and drain its 426-then-226 response pair, tolerating a
    /// missing 426 (spec.md §4.3/§5). Used both as a public operation and
    /// internally by the transfer cancellation path in `file_ops.rs`.
    pub async fn abort(&mut self) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.issue_abort().await;
        self.exit_busy();
        result
    }

    pub(crate) async fn issue_abort(&mut self) -> FtpResult<()> {
        let budget = Duration::from_secs(self.config.command_timeout_sec);
        let request = tokio::time::timeout(budget, self.codec.send("ABOR", None))
            .await
            .map_err(|_| FtpError::connection("timed out sending ABOR"))??;
        self.observers.emit(FtpEvent::RequestSent(&request));
        self.drain_abort_responses().await
    }

    pub(crate) async fn drain_abort_responses(&mut self) -> FtpResult<()> {
        let budget = Duration::from_secs(self.config.command_timeout_sec);
        let first = tokio::time::timeout(budget, self.codec.read_response())
            .await
            .map_err(|_| FtpError::connection("timed out waiting for ABOR's response"))??;
        self.observers.emit(FtpEvent::ResponseReceived(&first));
        if first.code == Some(426) {
            let second = tokio::time::timeout(budget, self.codec.read_response())
                .await
                .map_err(|_| FtpError::connection("timed out waiting for ABOR's second response"))??;
            self.observers.emit(FtpEvent::ResponseReceived(&second));
            if !second.is_success() {
                return Err(FtpError::from_response(&second));
            }
        } else if !first.is_success() {
            return Err(FtpError::from_response(&first));
        }
        Ok(())
    }

    // ─── Directory navigation ────────────────────────────────────────

    pub async fn get_working_directory(&mut self) -> FtpResult<String> {
        self.enter_busy()?;
        let result = self.refresh_pwd().await;
        self.exit_busy();
        match result {
            Ok(Some(pwd)) => {
                self.current_directory = pwd.clone();
                Ok(pwd)
            }
            Ok(None) => Err(FtpError::protocol("malformed PWD reply", None)),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn refresh_pwd(&mut self) -> FtpResult<Option<String>> {
        let resp = self.exec("PWD", None).await?;
        if !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }
        Ok(parse_pwd(&resp.text))
    }

    pub async fn change_directory(&mut self, path: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.change_directory_inner(path).await;
        self.exit_busy();
        result
    }

    async fn change_directory_inner(&mut self, path: &str) -> FtpResult<()> {
        let resp = self.exec("CWD", Some(path)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }
        if let Ok(Some(pwd)) = self.refresh_pwd().await {
            self.current_directory = pwd;
        }
        Ok(())
    }

    pub async fn change_directory_up(&mut self) -> FtpResult<()> {
        self.enter_busy()?;
        let resp = self.exec("CDUP", None).await;
        let result = match resp {
            Ok(resp) if resp.is_success() => {
                if let Ok(Some(pwd)) = self.refresh_pwd().await {
                    self.current_directory = pwd;
                }
                Ok(())
            }
            Ok(resp) => Err(FtpError::from_response(&resp)),
            Err(e) => Err(e),
        };
        self.exit_busy();
        result
    }

    /// Split `path` on `/` and `CWD` into each segment in turn — required
    /// by servers that reject a full path in one `CWD` (spec.md §4.4).
    pub async fn change_directory_multi_path(&mut self, path: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.change_directory_multi_path_inner(path).await;
        self.exit_busy();
        result
    }

    async fn change_directory_multi_path_inner(&mut self, path: &str) -> FtpResult<()> {
        if path.starts_with('/') {
            let resp = self.exec("CWD", Some("/")).await?;
            if !resp.is_success() {
                return Err(FtpError::from_response(&resp));
            }
        }
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let resp = self.exec("CWD", Some(segment)).await?;
            if !resp.is_success() {
                return Err(FtpError::from_response(&resp));
            }
        }
        if let Ok(Some(pwd)) = self.refresh_pwd().await {
            self.current_directory = pwd;
        }
        Ok(())
    }

    pub fn get_system_type(&self) -> Option<&str> {
        self.system_type.as_deref()
    }

    pub fn get_features(&self) -> &FeatureSet {
        &self.features
    }

    // ─── Transfer type / mode ────────────────────────────────────────

    pub async fn set_type(&mut self, data_type: DataType) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.set_type_inner(data_type).await;
        self.exit_busy();
        result
    }

    async fn set_type_inner(&mut self, data_type: DataType) -> FtpResult<()> {
        let code = match data_type {
            DataType::Ascii => "A",
            DataType::Binary => "I",
            DataType::Ebcdic => "E",
        };
        let resp = self.exec("TYPE", Some(code)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }
        self.config.data_type = data_type;
        Ok(())
    }

    /// `MODE Z` / `MODE S` — toggle zlib data-channel compression.
    pub async fn set_compression(&mut self, enabled: bool) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.set_compression_inner(enabled).await;
        self.exit_busy();
        result
    }

    async fn set_compression_inner(&mut self, enabled: bool) -> FtpResult<()> {
        let arg = if enabled { "Z" } else { "S" };
        let resp = self.exec("MODE", Some(arg)).await?;
        if !resp.is_success() {
            return Err(FtpError::CommandNotSupported {
                command: format!("MODE {}", arg),
                last_response: Some(resp),
            });
        }
        self.compression = if enabled {
            CompressionState::ZlibOn
        } else {
            CompressionState::Off
        };
        Ok(())
    }

    pub async fn set_utf8_on(&mut self) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.set_options_inner("UTF8", "ON").await;
        self.exit_busy();
        result
    }

    pub async fn set_utf8_off(&mut self) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.set_options_inner("UTF8", "OFF").await;
        self.exit_busy();
        result
    }

    pub async fn set_options(&mut self, name: &str, value: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.set_options_inner(name, value).await;
        self.exit_busy();
        result
    }

    async fn set_options_inner(&mut self, name: &str, value: &str) -> FtpResult<()> {
        let args = format!("{} {}", name, value);
        let resp = self.exec("OPTS", Some(&args)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }
        Ok(())
    }

    /// Raw pass-through for any command the façade doesn't expose
    /// directly.
    pub async fn quote(&mut self, line: &str) -> FtpResult<Response> {
        self.enter_busy()?;
        let mut parts = line.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or_default().to_string();
        let args = parts.next().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        let result = self.exec(&verb, args.as_deref()).await;
        self.exit_busy();
        result
    }

    pub async fn site(&mut self, args: &str) -> FtpResult<Response> {
        self.enter_busy()?;
        let result = self.exec("SITE", Some(args)).await;
        self.exit_busy();
        result
    }

    pub async fn allocate_storage(&mut self, bytes: u64) -> FtpResult<()> {
        self.enter_busy()?;
        let size = bytes.to_string();
        let resp = self.exec("ALLO", Some(&size)).await;
        let result = match resp {
            Ok(resp) if resp.is_success() => Ok(()),
            Ok(resp) => Err(FtpError::from_response(&resp)),
            Err(e) => Err(e),
        };
        self.exit_busy();
        result
    }

    pub async fn get_file_size(&mut self, path: &str) -> FtpResult<u64> {
        self.enter_busy()?;
        let result = self.get_file_size_inner(path).await;
        self.exit_busy();
        result
    }

    pub(crate) async fn get_file_size_inner(&mut self, path: &str) -> FtpResult<u64> {
        let resp = self.exec("SIZE", Some(path)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }
        response_payload(&resp.text).parse::<u64>().map_err(|_| {
            FtpError::protocol(format!("malformed SIZE reply: {}", resp.text), Some(resp))
        })
    }

    pub async fn get_file_date_time(
        &mut self,
        path: &str,
    ) -> FtpResult<chrono::DateTime<chrono::Utc>> {
        self.enter_busy()?;
        let result = self.get_file_date_time_inner(path).await;
        self.exit_busy();
        result
    }

    async fn get_file_date_time_inner(
        &mut self,
        path: &str,
    ) -> FtpResult<chrono::DateTime<chrono::Utc>> {
        let resp = self.exec("MDTM", Some(path)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }
        parse_mdtm(response_payload(&resp.text))
            .ok_or_else(|| FtpError::protocol(format!("malformed MDTM reply: {}", resp.text), Some(resp)))
    }

    // ─── Directory listing ───────────────────────────────────────────

    /// Choose UNIX vs. DOS output parsing based on the cached `SYST`
    /// dialect; `MLSD` output is always handled by the MLSx parser since
    /// its format is self-describing.
    fn parser_for_list(&self) -> fn(&str) -> DirectoryListing {
        match &self.system_type {
            Some(s) if s.to_lowercase().contains("windows") => parser::parse_dos_listing,
            _ => parser::parse_unix_listing,
        }
    }

    pub async fn get_dir_list(
        &mut self,
        path: Option<&str>,
        method: ListingMethod,
    ) -> FtpResult<DirectoryListing> {
        self.enter_busy()?;
        let result = self.get_dir_list_inner(path, method).await;
        self.exit_busy();
        result
    }

    pub(crate) async fn get_dir_list_inner(
        &mut self,
        path: Option<&str>,
        method: ListingMethod,
    ) -> FtpResult<DirectoryListing> {
        match method {
            ListingMethod::Mlsd => {
                let raw = self.list_raw("MLSD", path).await?;
                Ok(parser::parse_mlsx_listing(&raw))
            }
            ListingMethod::ListExtended => {
                let args = match path {
                    Some(p) => format!("-aL {}", p),
                    None => "-aL".to_string(),
                };
                let raw = self.list_raw("LIST", Some(&args)).await?;
                Ok((self.parser_for_list())(&raw))
            }
            ListingMethod::List => {
                let raw = self.list_raw("LIST", path).await?;
                Ok((self.parser_for_list())(&raw))
            }
            ListingMethod::Automatic => {
                if self.features.mlsd() {
                    let raw = self.list_raw("MLSD", path).await?;
                    return Ok(parser::parse_mlsx_listing(&raw));
                }
                let args = match path {
                    Some(p) => format!("-aL {}", p),
                    None => "-aL".to_string(),
                };
                match self.list_raw("LIST", Some(&args)).await {
                    Ok(raw) => Ok((self.parser_for_list())(&raw)),
                    Err(_) => {
                        let raw = self.list_raw("LIST", path).await?;
                        Ok((self.parser_for_list())(&raw))
                    }
                }
            }
        }
    }

    /// `MLST` when advertised, else a single-entry `LIST` (spec.md §4.4).
    pub async fn get_file_info(&mut self, path: &str) -> FtpResult<DirectoryEntry> {
        self.enter_busy()?;
        let result = self.get_file_info_inner(path).await;
        self.exit_busy();
        result
    }

    async fn get_file_info_inner(&mut self, path: &str) -> FtpResult<DirectoryEntry> {
        if self.features.mlst() {
            let resp = self.exec("MLST", Some(path)).await?;
            if !resp.is_success() {
                return Err(FtpError::from_response(&resp));
            }
            let line = resp.text.lines().nth(1).unwrap_or(&resp.text).trim();
            let listing = parser::parse_mlsx_listing(line);
            return listing
                .entries
                .into_iter()
                .next()
                .ok_or_else(|| FtpError::protocol("MLST returned no entry", Some(resp)));
        }

        let raw = self.list_raw("LIST", Some(path)).await?;
        let listing = (self.parser_for_list())(&raw);
        listing
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| FtpError::protocol(format!("no LIST entry for {}", path), None))
    }

    /// Open a data channel, run `command`/`args` to completion, and return
    /// the listing body as text. Used by `get_dir_list`/`get_file_info`.
    pub(crate) async fn list_raw(&mut self, command: &str, args: Option<&str>) -> FtpResult<String> {
        let mode = self.config.transfer_mode;
        let ds = self.open_data_channel(mode).await?;
        let resp = self.exec(command, args).await?;
        let is_preliminary = matches!(resp.group, Some(ResponseGroup::PositivePreliminary));
        if !is_preliminary && !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }

        let data = read_data_stream_to_string(ds).await?;

        let budget = Duration::from_secs(self.config.command_timeout_sec);
        let done = tokio::time::timeout(budget, self.codec.read_response())
            .await
            .map_err(|_| FtpError::connection("timed out waiting for the listing's final response"))??;
        self.observers.emit(FtpEvent::ResponseReceived(&done));
        if !done.is_success() {
            return Err(FtpError::from_response(&done));
        }
        Ok(data)
    }

    // ─── Data channel factory wrapper ─────────────────────────────────

    pub(crate) async fn open_data_channel(&mut self, mode: TransferMode) -> FtpResult<DataStream> {
        let opts = DataChannelOptions {
            mode,
            allow_fallback: self.config.allow_data_mode_fallback,
            control_peer_ip: self.control_peer_ip,
            host: &self.config.host,
            tls_active: self.prot_p,
            validator: self.validator.clone(),
            always_accept_server_certificate: self.config.always_accept_server_certificate,
            data_timeout: Duration::from_secs(self.config.data_timeout_sec),
            active_bind: self.config.active_bind_address.as_deref(),
            observers: &self.observers,
        };
        transfer::open_data_channel(&mut self.codec, &opts).await
    }

    // ─── FEAT ─────────────────────────────────────────────────────────

    async fn probe_features(&mut self) -> FtpResult<FeatureSet> {
        let resp = self.exec("FEAT", None).await?;
        if !resp.is_success() {
            return Ok(FeatureSet::default());
        }

        let code = resp.code.unwrap_or(211);
        let terminator = format!("{} ", code);
        let mut features = std::collections::HashMap::new();
        let mut raw = Vec::new();

        for line in resp.text.lines().skip(1) {
            let line = line.trim();
            if line.is_empty() || line.starts_with(&terminator) {
                continue;
            }
            raw.push(line.to_string());

            let name_end = line
                .find(|c: char| c.is_whitespace() || c == ';')
                .unwrap_or(line.len());
            let name = line[..name_end].to_uppercase();
            let rest = line[name_end..].trim_start_matches([' ', ';']);
            let args: Vec<String> = rest
                .split(|c: char| c == ';' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            features.insert(name, args);
        }

        Ok(FeatureSet { features, raw })
    }
}

/// Strip the leading `NNN ` (or `NNN-`) reply-code prefix from a
/// single-line response's first line, leaving just the payload — e.g.
/// `"213 1830"` → `"1830"`. Needed for replies where the code and the
/// payload share one line (`SIZE`, `MDTM`); multi-line replies like
/// `FEAT` carry their payload on separate, code-free lines already.
fn response_payload(text: &str) -> &str {
    let first_line = text.lines().next().unwrap_or(text);
    match first_line.split_once([' ', '-']) {
        Some((code, rest)) if code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit()) => {
            rest.trim()
        }
        _ => first_line.trim(),
    }
}

/// Parse the quoted path out of a `257` `PWD` reply, unescaping doubled
/// quotes per RFC 959.
fn parse_pwd(text: &str) -> Option<String> {
    let line = text.lines().next()?;
    let start = line.find('"')? + 1;
    let rest = &line[start..];
    let mut result = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                result.push('"');
                chars.next();
            } else {
                return Some(result);
            }
        } else {
            result.push(c);
        }
    }
    None
}

/// Parse an `MDTM` reply body: `YYYYMMDDHHMMSS` with an optional
/// fractional-seconds suffix, UTC.
fn parse_mdtm(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{NaiveDateTime, TimeZone, Utc};
    let base = if text.len() >= 14 { &text[..14] } else { text };
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

async fn read_data_stream_to_string(ds: DataStream) -> FtpResult<String> {
    let mut buf = Vec::new();
    match ds {
        DataStream::Plain(mut tcp) => {
            tcp.read_to_end(&mut buf).await?;
        }
        DataStream::Tls(mut tls) => {
            tls.read_to_end(&mut buf).await?;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_pwd_with_escaped_quote() {
        let text = "257 \"/home/us\"\"er\" is the current directory";
        assert_eq!(parse_pwd(text).as_deref(), Some("/home/us\"er"));
    }

    #[test]
    fn parses_plain_mdtm_reply() {
        use chrono::{TimeZone, Utc};
        let dt = parse_mdtm("20230615120000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 6, 15, 12, 0, 0).unwrap());
    }
}
