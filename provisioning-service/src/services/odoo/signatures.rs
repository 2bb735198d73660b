//! Known Odoo error phrasings, matched case-insensitively as substrings.

const SESSION_EXPIRED: &[&str] = &[
    "session expired",
    "session_expired",
    "sessionexpiredexception",
    "invalid session",
];

const UNIQUENESS_VIOLATION: &[&str] = &[
    "same login",
    "already exists",
    "unique constraint",
    "duplicate key",
];

fn contains_any(message: &str, phrases: &[&str]) -> bool {
    let lowered = message.to_lowercase();
    phrases.iter().any(|phrase| lowered.contains(phrase))
}

pub fn is_session_expired(message: &str) -> bool {
    contains_any(message, SESSION_EXPIRED)
}

pub fn is_uniqueness_violation(message: &str) -> bool {
    contains_any(message, UNIQUENESS_VIOLATION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry_is_case_insensitive() {
        assert!(is_session_expired("Odoo Session Expired"));
        assert!(is_session_expired(
            "odoo.http.SessionExpiredException: Session expired (SessionExpiredException)"
        ));
        assert!(!is_session_expired("Access Denied"));
    }

    #[test]
    fn test_uniqueness_violation() {
        assert!(is_uniqueness_violation(
            "You can not have two users with the same login !"
        ));
        assert!(is_uniqueness_violation(
            "duplicate key value violates unique constraint \"res_users_login_key\""
        ));
        assert!(!is_uniqueness_violation("Invalid field 'foo' on model 'res.users'"));
    }
}
