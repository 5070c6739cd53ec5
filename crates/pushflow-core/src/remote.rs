//! リモート操作
//!
//! SSH でのコマンド実行・ファイル読み込み・シークレット書き込みと、
//! rsync によるチェックサムベースのファイル同期を提供します。

use crate::error::{PushError, Result};
use crate::model::Target;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// SSH がクライアント側の接続エラーで返す終了コード
const SSH_CONNECTION_FAILURE: i32 = 255;

/// リモートコマンドの実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// 終了コード（シグナル終了の場合は None）
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// 失敗理由として表示する文字列
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        match (self.status, stderr.is_empty()) {
            (Some(code), true) => format!("exit code {}", code),
            (Some(code), false) => format!("exit code {}: {}", code, stderr),
            (None, _) => format!("signal で終了しました: {}", stderr),
        }
    }
}

/// リモートホストに対する操作
pub trait RemoteTransport {
    /// コマンドを実行する
    ///
    /// 非ゼロ終了は `CommandOutput` で報告し、エラーにはしない。
    /// `Err` はコマンド自体を起動できなかった場合のみ。
    fn run(&self, target: &Target, command: &str) -> Result<CommandOutput>;

    /// リモートファイルの内容を読む（存在しない場合は空文字列）
    fn read_file(&self, target: &Target, path: &str) -> Result<String>;

    /// ローカルファイルをリモートへ同期し、内容が変わったかを返す
    ///
    /// 判定は内容のチェックサムのみで行い、タイムスタンプやパーミッションは見ない。
    fn sync_file(&self, local: &Path, target: &Target, remote_path: &str) -> Result<bool>;

    /// シークレットを書き込み、所有者のみ読める権限にする
    fn write_secret(&self, target: &Target, content: &str, remote_path: &str) -> Result<()>;
}

/// ssh / rsync コマンドによる実装
#[derive(Debug, Clone)]
pub struct SshTransport {
    connect_timeout: u64,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self { connect_timeout: 10 }
    }
}

impl SshTransport {
    pub fn new(connect_timeout: u64) -> Self {
        Self { connect_timeout }
    }

    fn ssh_options(&self, target: &Target) -> Vec<String> {
        vec![
            "-p".to_string(),
            target.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ]
    }

    fn ssh(&self, target: &Target, command: &str, input: Option<&str>) -> Result<CommandOutput> {
        debug!(target = %target, command = %command, "Running remote command");

        let mut child = Command::new("ssh")
            .args(self.ssh_options(target))
            .arg(target.destination())
            .arg(command)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PushError::Transport {
                target: target.to_string(),
                message: format!("ssh を起動できません: {}", e),
            })?;

        if let Some(input) = input
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

impl RemoteTransport for SshTransport {
    fn run(&self, target: &Target, command: &str) -> Result<CommandOutput> {
        self.ssh(target, command, None)
    }

    fn read_file(&self, target: &Target, path: &str) -> Result<String> {
        let output = self.ssh(
            target,
            &format!("cat {} 2>/dev/null || true", shell_quote(path)),
            None,
        )?;
        if output.status == Some(SSH_CONNECTION_FAILURE) {
            return Err(PushError::Transport {
                target: target.to_string(),
                message: output.failure_message(),
            });
        }
        Ok(output.stdout)
    }

    fn sync_file(&self, local: &Path, target: &Target, remote_path: &str) -> Result<bool> {
        let ssh_command = format!("ssh {}", self.ssh_options(target).join(" "));
        let destination = format!("{}:{}", target.destination(), remote_path);

        debug!(local = %local.display(), destination = %destination, "Syncing file with rsync");

        let output = Command::new("rsync")
            .arg("-az")
            .arg("--checksum")
            .arg("--itemize-changes")
            .arg("-e")
            .arg(&ssh_command)
            .arg(local)
            .arg(&destination)
            .output()
            .map_err(|e| PushError::Transport {
                target: target.to_string(),
                message: format!("rsync を起動できません: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PushError::Transport {
                target: target.to_string(),
                message: format!(
                    "rsync 失敗 ({}): {}",
                    remote_path,
                    stderr.trim()
                ),
            });
        }

        Ok(itemize_reports_content_change(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn write_secret(&self, target: &Target, content: &str, remote_path: &str) -> Result<()> {
        let path = shell_quote(remote_path);
        let command = format!("umask 077 && cat > {path} && chmod 600 {path}");
        let output = self.ssh(target, &command, Some(content)).map_err(|e| {
            PushError::Secret(format!("{} への書き込みに失敗: {}", remote_path, e))
        })?;

        if !output.success() {
            return Err(PushError::Secret(format!(
                "{} ({}) への書き込みに失敗: {}",
                remote_path,
                target,
                output.failure_message()
            )));
        }
        Ok(())
    }
}

/// rsync `--itemize-changes` の出力が内容の転送を含むか
///
/// 先頭が `<` `>`（送受信）か `c`（新規作成）の行だけを変更とみなす。
/// `.f..t......` のような属性のみの更新は変更に数えない。
pub fn itemize_reports_content_change(stdout: &str) -> bool {
    stdout.lines().any(|line| {
        let mut chars = line.chars();
        matches!(
            (chars.next(), chars.next()),
            (Some('<' | '>' | 'c'), Some('f' | 'L'))
        )
    })
}

/// シェル用にエスケープ
pub fn shell_quote(s: &str) -> String {
    // シングルクォートでラップしてエスケープ
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// `mkdir -p` コマンドを組み立てる（ディレクトリがなければ `true`）
pub fn mkdir_command(dirs: &[String]) -> String {
    if dirs.is_empty() {
        return "true".to_string();
    }
    let quoted: Vec<String> = dirs.iter().map(|d| shell_quote(d)).collect();
    format!("mkdir -p {}", quoted.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_itemize_new_file() {
        assert!(itemize_reports_content_change(">f+++++++++ traefik.yml\n"));
    }

    #[test]
    fn test_itemize_content_update() {
        assert!(itemize_reports_content_change(">f.st...... dynamic1.yml\n"));
    }

    #[test]
    fn test_itemize_attribute_only_is_unchanged() {
        assert!(!itemize_reports_content_change(".f...p..... traefik.yml\n"));
        assert!(!itemize_reports_content_change(".f..t...... traefik.yml\n"));
        assert!(!itemize_reports_content_change(""));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/etc/a b"), "'/etc/a b'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_mkdir_command() {
        assert_eq!(mkdir_command(&[]), "true");
        assert_eq!(
            mkdir_command(&["/opt/podman/a".to_string(), "/opt/podman/b".to_string()]),
            "mkdir -p '/opt/podman/a' '/opt/podman/b'"
        );
    }

    #[test]
    fn test_failure_message() {
        let output = CommandOutput {
            status: Some(255),
            stdout: String::new(),
            stderr: "ssh: connect to host edge2 port 22: Connection refused\n".to_string(),
        };
        assert!(!output.success());
        assert_eq!(
            output.failure_message(),
            "exit code 255: ssh: connect to host edge2 port 22: Connection refused"
        );
    }

    #[test]
    #[ignore = "requires ssh access to a test host"]
    fn test_ssh_run_localhost() {
        let transport = SshTransport::default();
        let output = transport
            .run(&Target::new("localhost", 22, "root"), "true")
            .unwrap();
        assert!(output.success());
    }
}
