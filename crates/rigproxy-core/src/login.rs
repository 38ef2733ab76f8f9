//! Login packet rewriting.
//!
//! The first line a rig sends is a stratum `login` call:
//!
//! ```text
//! {"method":"login","params":{"login":"<account>[.<worker>]","agent":"...","pass":"..."}}
//! ```
//!
//! [`rewrite_login`] validates it and substitutes the account, worker id,
//! agent and password according to a [`LoginPolicy`]. Every other field of the
//! packet, and the order of its keys, is kept as the rig sent it.

use crate::error::{RelayError, RelayResult};
use serde_json::{Map, Value};

/// Accounts shorter than this are not treated as real wallet addresses.
pub const DEFAULT_WALLET_MIN_LEN: usize = 95;

/// Longest prefix of a rejected line quoted back in the error.
const PREVIEW_LEN: usize = 64;

/// Server-side rewrite rules for the login line.
#[derive(Debug, Clone)]
pub struct LoginPolicy {
    /// Wallet address substituted for the rig's account.
    pub wallet: String,
    /// Password forced onto every login. `None` or empty keeps the rig's value.
    pub password: Option<String>,
    /// User agent reported upstream for every rig.
    pub agent: String,
    /// Let accounts that look like real wallets through unchanged.
    pub bypass_wallet: bool,
    /// Keep the `.worker` suffix of the rig's login.
    pub bypass_worker_id: bool,
    /// Minimum account length for `bypass_wallet` to apply.
    pub wallet_min_len: usize,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            wallet: String::new(),
            password: None,
            agent: format!("rigproxy/{}", env!("CARGO_PKG_VERSION")),
            bypass_wallet: false,
            bypass_worker_id: false,
            wallet_min_len: DEFAULT_WALLET_MIN_LEN,
        }
    }
}

impl LoginPolicy {
    /// Apply the account and worker-id rules to a `login` value.
    pub fn rewrite_account(&self, login: &str) -> String {
        let (account, worker) = match login.split_once('.') {
            Some((account, worker)) => (account, Some(worker)),
            None => (login, None),
        };

        let account = if !self.bypass_wallet || account.chars().count() < self.wallet_min_len {
            self.wallet.as_str()
        } else {
            account
        };

        match worker {
            Some(worker) if self.bypass_worker_id => format!("{account}.{worker}"),
            _ => account.to_string(),
        }
    }

    fn forced_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Result of a successful rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginRewrite {
    /// Rewritten packet, newline terminated, ready to send upstream.
    pub line: String,
    /// `params.login` as the rig sent it.
    pub login: String,
    /// `params.agent` as the rig sent it, if any.
    pub agent: Option<String>,
}

/// Validate and rewrite the first line of a session.
///
/// # Errors
///
/// - [`RelayError::MalformedRequest`] if the line does not start with `{`, is
///   not valid JSON, or lacks an object `params` with a string `login`.
/// - [`RelayError::UnsupportedMethod`] if `method` is not `"login"`.
pub fn rewrite_login(line: &str, policy: &LoginPolicy) -> RelayResult<LoginRewrite> {
    if !line.starts_with('{') {
        return Err(RelayError::MalformedRequest(preview(line)));
    }

    let mut packet: Map<String, Value> = serde_json::from_str(line)
        .map_err(|e| RelayError::MalformedRequest(e.to_string()))?;

    match packet.get("method") {
        Some(Value::String(m)) if m == "login" => {}
        Some(Value::String(m)) => return Err(RelayError::UnsupportedMethod(m.clone())),
        Some(other) => return Err(RelayError::UnsupportedMethod(other.to_string())),
        None => return Err(RelayError::UnsupportedMethod("<missing>".to_string())),
    }

    let params = packet
        .get_mut("params")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| RelayError::MalformedRequest("params is not an object".to_string()))?;

    let login = params
        .get("login")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| RelayError::MalformedRequest("params.login is not a string".to_string()))?;

    let agent = match params.get("agent") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    params.insert("login".to_string(), Value::String(policy.rewrite_account(&login)));
    params.insert("agent".to_string(), Value::String(policy.agent.clone()));
    if let Some(pass) = policy.forced_password() {
        params.insert("pass".to_string(), Value::String(pass.to_string()));
    }

    let mut line = serde_json::to_string(&packet)
        .map_err(|e| RelayError::MalformedRequest(e.to_string()))?;
    line.push('\n');

    Ok(LoginRewrite { line, login, agent })
}

fn preview(line: &str) -> String {
    match line.char_indices().nth(PREVIEW_LEN) {
        Some((idx, _)) => format!("{} ...", &line[..idx]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = r#"{"method":"login","params":{"login":"abc.rig1","agent":"xmrig/6.0"}}"#;

    fn policy(bypass_wallet: bool, bypass_worker_id: bool) -> LoginPolicy {
        LoginPolicy {
            wallet: "W1".to_string(),
            password: None,
            agent: "srv/1.0".to_string(),
            bypass_wallet,
            bypass_worker_id,
            wallet_min_len: DEFAULT_WALLET_MIN_LEN,
        }
    }

    fn long_wallet() -> String {
        "4".repeat(DEFAULT_WALLET_MIN_LEN)
    }

    fn output_params(rewrite: &LoginRewrite) -> Map<String, Value> {
        let packet: Value = serde_json::from_str(rewrite.line.trim_end()).unwrap();
        packet["params"].as_object().unwrap().clone()
    }

    #[test]
    fn keeps_worker_id_when_bypassed() {
        let out = rewrite_login(LOGIN, &policy(false, true)).unwrap();
        assert_eq!(
            out.line,
            "{\"method\":\"login\",\"params\":{\"login\":\"W1.rig1\",\"agent\":\"srv/1.0\"}}\n"
        );
    }

    #[test]
    fn drops_worker_id_without_bypass() {
        let out = rewrite_login(LOGIN, &policy(false, false)).unwrap();
        assert_eq!(output_params(&out)["login"], "W1");
    }

    #[test]
    fn reports_client_supplied_values() {
        let out = rewrite_login(LOGIN, &policy(false, false)).unwrap();
        assert_eq!(out.login, "abc.rig1");
        assert_eq!(out.agent.as_deref(), Some("xmrig/6.0"));
    }

    #[test]
    fn wallet_replaced_regardless_of_length_without_bypass() {
        let wallet = long_wallet();
        let line = format!(
            r#"{{"method":"login","params":{{"login":"{wallet}.w","agent":"a"}}}}"#
        );
        let out = rewrite_login(&line, &policy(false, true)).unwrap();
        assert_eq!(output_params(&out)["login"], "W1.w");
    }

    #[test]
    fn long_account_passes_with_wallet_bypass() {
        let wallet = long_wallet();
        let line = format!(
            r#"{{"method":"login","params":{{"login":"{wallet}.w","agent":"a"}}}}"#
        );
        let out = rewrite_login(&line, &policy(true, true)).unwrap();
        assert_eq!(output_params(&out)["login"], format!("{wallet}.w"));

        let out = rewrite_login(&line, &policy(true, false)).unwrap();
        assert_eq!(output_params(&out)["login"], wallet);
    }

    #[test]
    fn short_account_replaced_even_with_wallet_bypass() {
        let short = "4".repeat(DEFAULT_WALLET_MIN_LEN - 1);
        let line = format!(r#"{{"method":"login","params":{{"login":"{short}"}}}}"#);
        let out = rewrite_login(&line, &policy(true, true)).unwrap();
        assert_eq!(output_params(&out)["login"], "W1");
    }

    #[test]
    fn threshold_is_configurable() {
        let mut p = policy(true, false);
        p.wallet_min_len = 3;
        let out = rewrite_login(LOGIN, &p).unwrap();
        assert_eq!(output_params(&out)["login"], "abc");
    }

    #[test]
    fn worker_suffix_keeps_everything_after_first_dot() {
        let p = policy(false, true);
        assert_eq!(p.rewrite_account("abc.rig.1"), "W1.rig.1");
        assert_eq!(p.rewrite_account("abc."), "W1.");
        assert_eq!(p.rewrite_account("abc"), "W1");
    }

    #[test]
    fn password_only_forced_when_configured() {
        let line = r#"{"method":"login","params":{"login":"a","pass":"mine"}}"#;

        let out = rewrite_login(line, &policy(false, false)).unwrap();
        assert_eq!(output_params(&out)["pass"], "mine");

        let mut p = policy(false, false);
        p.password = Some(String::new());
        let out = rewrite_login(line, &p).unwrap();
        assert_eq!(output_params(&out)["pass"], "mine");

        p.password = Some("x".to_string());
        let out = rewrite_login(line, &p).unwrap();
        assert_eq!(output_params(&out)["pass"], "x");

        let out = rewrite_login(LOGIN, &p).unwrap();
        assert_eq!(output_params(&out)["pass"], "x");
    }

    #[test]
    fn agent_always_overwritten() {
        let line = r#"{"method":"login","params":{"login":"a"}}"#;
        let out = rewrite_login(line, &policy(false, false)).unwrap();
        assert_eq!(out.agent, None);
        assert_eq!(output_params(&out)["agent"], "srv/1.0");
    }

    #[test]
    fn other_fields_survive_in_order() {
        let line = r#"{"id":1,"jsonrpc":"2.0","method":"login","params":{"login":"a.b","pass":"x","agent":"z","rigid":"r"}}"#;
        let out = rewrite_login(line, &policy(false, true)).unwrap();
        assert_eq!(
            out.line,
            "{\"id\":1,\"jsonrpc\":\"2.0\",\"method\":\"login\",\"params\":{\"login\":\"W1.b\",\"pass\":\"x\",\"agent\":\"srv/1.0\",\"rigid\":\"r\"}}\n"
        );
    }

    #[test]
    fn rewrite_is_stable_on_its_own_output() {
        for (bw, bid) in [(false, false), (false, true), (true, false), (true, true)] {
            let p = policy(bw, bid);
            let first = rewrite_login(LOGIN, &p).unwrap();
            let second = rewrite_login(first.line.trim_end(), &p).unwrap();
            assert_eq!(output_params(&first)["agent"], output_params(&second)["agent"]);
            assert_eq!(output_params(&first)["login"], output_params(&second)["login"]);
            assert_eq!(second.line, first.line);
        }
    }

    #[test]
    fn rejects_non_object_lines() {
        let err = rewrite_login("not json", &policy(false, false)).unwrap_err();
        assert!(matches!(err, RelayError::MalformedRequest(ref m) if m == "not json"));

        let err = rewrite_login(" {\"method\":\"login\"}", &policy(false, false)).unwrap_err();
        assert!(matches!(err, RelayError::MalformedRequest(_)));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = rewrite_login("{\"method\":", &policy(false, false)).unwrap_err();
        assert!(matches!(err, RelayError::MalformedRequest(_)));
    }

    #[test]
    fn long_garbage_is_truncated_in_error() {
        let line = "x".repeat(500);
        let err = rewrite_login(&line, &policy(false, false)).unwrap_err();
        match err {
            RelayError::MalformedRequest(m) => assert!(m.len() < 80, "got {} bytes", m.len()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_other_methods() {
        let line = r#"{"method":"submit","params":{"id":"1"}}"#;
        let err = rewrite_login(line, &policy(false, false)).unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedMethod(ref m) if m == "submit"));

        let err = rewrite_login(r#"{"params":{}}"#, &policy(false, false)).unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedMethod(_)));
    }

    #[test]
    fn rejects_login_without_params() {
        let err = rewrite_login(r#"{"method":"login"}"#, &policy(false, false)).unwrap_err();
        assert!(matches!(err, RelayError::MalformedRequest(_)));

        let line = r#"{"method":"login","params":{"login":42}}"#;
        let err = rewrite_login(line, &policy(false, false)).unwrap_err();
        assert!(matches!(err, RelayError::MalformedRequest(_)));
    }
}
