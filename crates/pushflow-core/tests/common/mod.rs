//! エンジンのテスト用ヘルパー
//!
//! ネットワークに出ずに、ホストごとのファイル内容とコマンド履歴を
//! メモリ上で再現します。

#![allow(dead_code)]

use pushflow_core::{
    CommandOutput, PushError, RemoteTransport, Result, Secrets, SecretsProvider, Target,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub mode: u32,
}

/// メモリ上のリモートホスト群
#[derive(Default)]
pub struct FakeTransport {
    files: RefCell<HashMap<(String, String), RemoteFile>>,
    commands: RefCell<Vec<(String, String)>>,
    unreachable: HashSet<String>,
    failing_syncs: HashSet<String>,
    failing_commands: HashSet<String>,
    failing_secrets: HashSet<String>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// このホストへの接続を常に失敗させる
    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    /// このリモートパスへの同期を失敗させる
    pub fn failing_sync(mut self, remote_path: &str) -> Self {
        self.failing_syncs.insert(remote_path.to_string());
        self
    }

    /// このコマンドを非ゼロ終了させる
    pub fn failing_command(mut self, command: &str) -> Self {
        self.failing_commands.insert(command.to_string());
        self
    }

    /// このリモートパスへのシークレット書き込みを失敗させる
    pub fn failing_secret(mut self, remote_path: &str) -> Self {
        self.failing_secrets.insert(remote_path.to_string());
        self
    }

    pub fn put_file(&self, host: &str, path: &str, content: &str) {
        self.files.borrow_mut().insert(
            (host.to_string(), path.to_string()),
            RemoteFile {
                content: content.to_string(),
                mode: 0o644,
            },
        );
    }

    pub fn set_mode(&self, host: &str, path: &str, mode: u32) {
        if let Some(file) = self
            .files
            .borrow_mut()
            .get_mut(&(host.to_string(), path.to_string()))
        {
            file.mode = mode;
        }
    }

    pub fn file(&self, host: &str, path: &str) -> Option<RemoteFile> {
        self.files
            .borrow()
            .get(&(host.to_string(), path.to_string()))
            .cloned()
    }

    pub fn content(&self, host: &str, path: &str) -> Option<String> {
        self.file(host, path).map(|f| f.content)
    }

    /// ホストごとのファイル内容をすべて連結したもの
    pub fn all_content_on(&self, host: &str) -> String {
        self.files
            .borrow()
            .iter()
            .filter(|((h, _), _)| h == host)
            .map(|(_, f)| f.content.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn commands_on(&self, host: &str) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn count_runs(&self, host: &str, command: &str) -> usize {
        self.commands_on(host).iter().filter(|c| *c == command).count()
    }

    pub fn total_commands(&self) -> usize {
        self.commands.borrow().len()
    }

    fn check_reachable(&self, target: &Target) -> Result<()> {
        if self.unreachable.contains(&target.host) {
            return Err(PushError::Transport {
                target: target.to_string(),
                message: format!("ssh: connect to host {} port {}: Connection refused", target.host, target.port),
            });
        }
        Ok(())
    }
}

impl RemoteTransport for FakeTransport {
    fn run(&self, target: &Target, command: &str) -> Result<CommandOutput> {
        if self.unreachable.contains(&target.host) {
            return Ok(CommandOutput {
                status: Some(255),
                stdout: String::new(),
                stderr: format!("ssh: connect to host {} port {}: Connection refused", target.host, target.port),
            });
        }
        self.commands
            .borrow_mut()
            .push((target.host.clone(), command.to_string()));

        let status = if self.failing_commands.contains(command) { 1 } else { 0 };
        Ok(CommandOutput {
            status: Some(status),
            stdout: String::new(),
            stderr: if status == 0 { String::new() } else { "failed".to_string() },
        })
    }

    fn read_file(&self, target: &Target, path: &str) -> Result<String> {
        self.check_reachable(target)?;
        Ok(self.content(&target.host, path).unwrap_or_default())
    }

    fn sync_file(&self, local: &Path, target: &Target, remote_path: &str) -> Result<bool> {
        self.check_reachable(target)?;
        if self.failing_syncs.contains(remote_path) {
            return Err(PushError::Transport {
                target: target.to_string(),
                message: format!("rsync 失敗 ({}): Permission denied", remote_path),
            });
        }

        let content = std::fs::read_to_string(local)?;
        let key = (target.host.clone(), remote_path.to_string());
        let mut files = self.files.borrow_mut();

        // 内容のみで比較し、パーミッションは触らない
        if let Some(existing) = files.get_mut(&key) {
            if existing.content == content {
                return Ok(false);
            }
            existing.content = content;
            return Ok(true);
        }
        files.insert(key, RemoteFile { content, mode: 0o644 });
        Ok(true)
    }

    fn write_secret(&self, target: &Target, content: &str, remote_path: &str) -> Result<()> {
        self.check_reachable(target)
            .map_err(|e| PushError::Secret(e.to_string()))?;
        if self.failing_secrets.contains(remote_path) {
            return Err(PushError::Transport {
                target: target.to_string(),
                message: format!("install 失敗 ({}): Read-only file system", remote_path),
            });
        }
        self.files.borrow_mut().insert(
            (target.host.clone(), remote_path.to_string()),
            RemoteFile {
                content: content.to_string(),
                mode: 0o600,
            },
        );
        Ok(())
    }
}

/// 固定の secrets を返す
pub struct StaticSecrets(pub Secrets);

impl SecretsProvider for StaticSecrets {
    fn decrypt(&self, _source: &Path) -> Result<Secrets> {
        Ok(self.0.clone())
    }
}
