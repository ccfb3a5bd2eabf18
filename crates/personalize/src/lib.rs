//! Device personalization for secure-element manufacturing.
//!
//! This crate injects a device's unique secrets exactly once during
//! manufacturing: key manager root seeds into write-once flash info pages,
//! the creator root key shares and the RMA unlock token digest into the OTP
//! secret partition, followed by an irreversible lock of that partition.
//!
//! # Session
//!
//! - **Precondition Gate**: lifecycle state must be DEV, PROD or PROD_END and
//!   the random source must be reachable
//! - **Idempotency Guard**: a locked partition short-circuits the session
//! - **Secret Material Generator**: every secret drawn independently
//! - **Dual-Storage Writer**: flash seeds, then OTP secrets
//! - **Partition Locker** and **Completion Verifier**
//! - **Export Packager**: public key and wrapped RMA token only
//!
//! # Security Model
//!
//! No secret byte ever appears in the export bundle, in a log line, or in an
//! error. Secret containers zeroize on drop. Any failure after the first
//! write is reported with a disposition that forbids a blind retry.
//!
//! Hardware is reached only through the controller traits ([`FlashController`],
//! [`OtpController`], [`LifecycleController`], [`EntropySource`]), so the
//! [`sim`] controllers can stand in for silicon.

pub mod ecc;
pub mod entropy;
pub mod error;
pub mod export;
pub mod flash;
pub mod gate;
pub mod generator;
pub mod guard;
pub mod lifecycle;
pub mod lock;
pub mod otp;
pub mod personalize;
pub mod rma_wrap;
pub mod secrets;
pub mod sim;
pub mod state;
pub mod verify;
pub mod write_once;
pub mod writer;

pub use ecc::{EcKeyPair, EccError, EccPrimitive, P256Primitive};
pub use entropy::{EntropyError, EntropySource, OsEntropy};
pub use error::{
    Disposition, GenerationError, LockError, PreconditionError, ProvisioningError, QueryError,
    WriteError,
};
pub use export::{ExportBundle, ExportPackager, ExportStatus};
pub use flash::{FlashController, FlashError, InfoPage};
pub use gate::check_preconditions;
pub use generator::{PublicExportable, SecretMaterialGenerator};
pub use guard::{inspect_residue, is_already_provisioned, Residue};
pub use lifecycle::{LifecycleController, LifecycleError, LifecycleState};
pub use lock::lock_secret_partition;
pub use otp::{OtpController, OtpError, OtpSlot, SecretPartitionState};
pub use personalize::{provision_device, Personalizer};
pub use rma_wrap::{unwrap_rma_token, UnwrapError, WrappedRmaToken};
pub use state::{ErrorKind, PersonalizationSession, SessionState};
pub use verify::check_personalization_complete;
