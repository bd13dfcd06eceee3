//! # ftps-client — FTP/FTPS client library
//!
//! Implements RFC 959 with common extensions: RFC 2228/4217 (`AUTH TLS`,
//! Explicit & Implicit FTPS), RFC 2389 (`FEAT`), RFC 2428 (`EPSV`/`EPRT`),
//! RFC 3659 (`MLSD`/`MLST`, `SIZE`, `MDTM`), plus `MODE Z` zlib
//! compression and resumable transfers with integrity verification.
//!
//! A [`FtpClient`] is a single-threaded, blocking actor: every public
//! method runs the full request/response exchange it needs before
//! returning, and a reentrancy guard rejects an overlapping call on the
//! same handle with [`FtpError::Busy`] rather than interleaving two
//! operations on one control channel.
//!
//! ```no_run
//! use ftps_client::{FtpClient, FtpConnectionConfig};
//!
//! # async fn run() -> ftps_client::FtpResult<()> {
//! let config = FtpConnectionConfig {
//!     host: "ftp.example.com".into(),
//!     ..Default::default()
//! };
//! let mut client = FtpClient::connect(config).await?;
//! let listing = client.get_dir_list(None, Default::default()).await?;
//! for entry in listing.entries {
//!     println!("{}", entry.name());
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod client;
pub mod compression;
pub mod connection;
pub mod directory;
pub mod error;
pub mod events;
pub mod file_ops;
pub mod integrity;
pub mod parser;
pub mod protocol;
pub mod proxy;
pub mod tls;
pub mod transfer;
pub mod types;

pub use cancel::CancellationHandle;
pub use client::FtpClient;
pub use error::{FtpError, FtpResult};
pub use events::{FtpEvent, FtpObserver};
pub use tls::CertificateValidator;
pub use types::*;
