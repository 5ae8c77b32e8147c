use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of the operator signed in to a shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Shop every game, report and commission call is scoped to.
    pub shop_id: String,
    /// Bearer token issued at login, if the server sent one.
    pub token: Option<String>,
    /// Name shown in the console header.
    pub display_name: String,
    /// User object returned by the server, kept verbatim.
    pub user: Value,
}

impl Session {
    /// Build a session from the login response, preferring the shop id the
    /// server reports for the user over the one typed in.
    pub fn from_login(
        entered_shop_id: &str,
        username: &str,
        token: Option<String>,
        user: Value,
    ) -> Self {
        let shop_id = user
            .get("shopId")
            .or_else(|| user.get("shop_id"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(entered_shop_id)
            .to_string();
        let display_name = display_name_for(&user, username, &shop_id);
        let token = token.filter(|token| !token.is_empty());
        Self {
            shop_id,
            token,
            display_name,
            user,
        }
    }

    /// Whether the session carries a usable shop identity.
    pub fn has_shop(&self) -> bool {
        !self.shop_id.trim().is_empty()
    }
}

/// Fields written to `session.json`; stored and cleared together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub(crate) token: Option<String>,
    pub(crate) shop_id: String,
    #[serde(default)]
    pub(crate) user: Value,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            token: session.token.clone(),
            shop_id: session.shop_id.clone(),
            user: session.user.clone(),
        }
    }
}

impl From<PersistedSession> for Session {
    fn from(persisted: PersistedSession) -> Self {
        let username = persisted
            .user
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let display_name = display_name_for(&persisted.user, &username, &persisted.shop_id);
        Self {
            shop_id: persisted.shop_id,
            token: persisted.token.filter(|token| !token.is_empty()),
            display_name,
            user: persisted.user,
        }
    }
}

fn display_name_for(user: &Value, username: &str, shop_id: &str) -> String {
    user.get("name")
        .and_then(Value::as_str)
        .or_else(|| user.get("username").and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or_else(|| Some(username.trim()).filter(|name| !name.is_empty()))
        .unwrap_or(shop_id)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_shop_id_wins_over_entered_one() {
        let session = Session::from_login(
            "typed",
            "cashier",
            Some("tok".to_string()),
            json!({"shopId": "lidu", "name": "Lidu Hall"}),
        );
        assert_eq!(session.shop_id, "lidu");
        assert_eq!(session.display_name, "Lidu Hall");
        assert_eq!(session.token.as_deref(), Some("tok"));
    }

    #[test]
    fn display_name_falls_back_to_username_then_shop() {
        let session = Session::from_login("lidu", "cashier", None, json!({}));
        assert_eq!(session.display_name, "cashier");
        assert_eq!(session.shop_id, "lidu");

        let session = Session::from_login("lidu", " ", Some(String::new()), Value::Null);
        assert_eq!(session.display_name, "lidu");
        assert_eq!(session.token, None);
    }
}
