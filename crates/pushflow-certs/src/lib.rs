//! PushFlow 証明書管理
//!
//! ワイルドカード証明書を lego で取得してローカルのストアに保持し、
//! SSH 経由で各ホストの `/etc/ssl/` に配布します。
//!
//! - `status`: ストア内の証明書の有効期限を表示
//! - `issue`: しきい値を下回っていれば発行・更新（`--force` で常に更新）
//! - `distribute`: 配布先へ送り、変更があれば post_deploy を実行
//! - `renew`: issue → distribute

pub mod error;
pub mod expiry;
pub mod lego;
pub mod manager;
pub mod policy;
pub mod secrets;
pub mod store;

pub use error::{CertError, Result};
pub use expiry::{CertInspector, OpensslInspector, parse_enddate};
pub use lego::{CertIssuer, LegoAction, LegoIssuer};
pub use manager::{
    CertManager, CertStatus, DistributionReport, IssueOutcome, TargetDistribution,
};
pub use policy::{CertState, DEFAULT_RENEW_DAYS, Decision, RenewalPolicy, days_left};
pub use secrets::{CertSecrets, CertTarget};
pub use store::{CertPaths, CertStore, remote_cert_paths};
