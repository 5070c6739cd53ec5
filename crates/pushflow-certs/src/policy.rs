//! 更新ポリシー

use chrono::{DateTime, Utc};

pub const DEFAULT_RENEW_DAYS: i64 = 30;

/// 発行・更新の判断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// まだ有効なので何もしない
    Skip { days_left: i64 },
    /// 既存の証明書を更新する
    Renew { force: bool },
    /// 証明書がないので新規発行する
    Issue,
}

/// ストア内の証明書の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertState {
    /// 未発行
    Missing,
    /// 存在するが有効期限を読めない
    Unreadable,
    Expires(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    pub threshold_days: i64,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            threshold_days: DEFAULT_RENEW_DAYS,
        }
    }
}

impl RenewalPolicy {
    pub fn new(threshold_days: i64) -> Self {
        Self { threshold_days }
    }

    pub fn decide(&self, state: CertState, now: DateTime<Utc>, force: bool) -> Decision {
        match state {
            CertState::Missing => Decision::Issue,
            _ if force => Decision::Renew { force: true },
            CertState::Expires(expiry) => {
                let days_left = days_left(expiry, now);
                if days_left > self.threshold_days {
                    Decision::Skip { days_left }
                } else {
                    Decision::Renew { force: false }
                }
            }
            CertState::Unreadable => Decision::Renew { force: false },
        }
    }

    /// lego `renew --days` に渡す値
    pub fn renew_days(&self, force: bool) -> i64 {
        if force { 9999 } else { self.threshold_days }
    }

    /// 警告を出すべき残り日数か
    pub fn is_expiring(&self, days_left: i64) -> bool {
        days_left < self.threshold_days
    }
}

/// 有効期限までの残り日数（端数切り捨て）
pub fn days_left(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_days()
}
