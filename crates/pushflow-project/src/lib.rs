//! PushFlow プロジェクトファイル
//!
//! `pushflow.kdl` に、配布するサービス・ホスト一覧・証明書の設定を記述します。
//!
//! ```kdl
//! project "homelab"
//!
//! service "coturn" {
//!     file "turnserver.conf.tera" remote="/etc/turnserver/turnserver.conf"
//!     restart "systemctl restart coturn"
//! }
//!
//! host "edge-1" address="edge1.example.org" port=2222
//! ```

pub mod error;
pub mod model;
pub mod parser;
pub mod spec;

pub use error::*;
pub use model::*;
pub use parser::*;
pub use spec::build_service_spec;
