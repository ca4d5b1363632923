const TOKEN_SOURCE: &str = include_str!("../src/auth/token.rs");
const SESSION_SOURCE: &str = include_str!("../src/auth/session.rs");
const MIDDLEWARE_SOURCE: &str = include_str!("../src/auth/middleware.rs");
const RESOLVER_SOURCE: &str = include_str!("../src/auth/resolver.rs");
const WS_SOURCE: &str = include_str!("../src/ws/mod.rs");

#[test]
fn bootstrap_tokens_expire_after_thirty_minutes() {
    assert!(TOKEN_SOURCE.contains("pub const REDIRECT_TOKEN_TTL_MINUTES: i64 = 30"));
}

#[test]
fn token_verification_fails_closed() {
    assert!(
        TOKEN_SOURCE.contains("verify_slice"),
        "signatures must be checked with the MAC's constant-time comparison"
    );
    assert!(
        TOKEN_SOURCE.contains("Expired"),
        "expiry must be a distinct verification failure"
    );
    assert!(
        TOKEN_SOURCE.contains("fn verify_at"),
        "verification must be testable at a fixed instant"
    );
}

#[test]
fn session_cookies_carry_the_hardening_attributes() {
    for attribute in ["HttpOnly", "Path=/", "SameSite=Lax", "Max-Age=259200"] {
        assert!(
            SESSION_SOURCE.contains(attribute),
            "session cookie must set {attribute}"
        );
    }
    assert!(
        SESSION_SOURCE.contains("Secure"),
        "production cookies must be Secure"
    );
    assert!(SESSION_SOURCE.contains("pub const SESSION_LIFETIME_DAYS: i64 = 3"));
}

#[test]
fn the_middleware_validates_the_session_before_resolving_membership() {
    let session_check = MIDDLEWARE_SOURCE
        .find("sessions.validate")
        .expect("middleware should validate the session");
    let membership_check = MIDDLEWARE_SOURCE
        .find("resolver::resolve")
        .expect("middleware should resolve membership");
    assert!(
        session_check < membership_check,
        "session validation must come before membership resolution"
    );
    assert!(
        MIDDLEWARE_SOURCE.contains("blank_cookie"),
        "an invalid session must clear the cookie"
    );
}

#[test]
fn membership_misses_and_store_failures_are_distinct() {
    assert!(
        RESOLVER_SOURCE.contains("ApiError::forbidden"),
        "a missing membership is Forbidden"
    );
    assert!(
        RESOLVER_SOURCE.contains("ApiError::internal"),
        "a store failure is an internal error, not a denial"
    );
    assert!(
        RESOLVER_SOURCE.contains("active_member"),
        "deactivated members must not resolve"
    );
}

#[test]
fn websocket_handshakes_reject_with_401_before_upgrading() {
    assert!(
        WS_SOURCE.contains("ErrorCode::Unauthorized"),
        "a failed websocket handshake answers 401"
    );
    let auth_check = WS_SOURCE
        .find("sessions.validate")
        .expect("the handshake should validate the session");
    let upgrade = WS_SOURCE.find("on_upgrade").expect("the handshake should upgrade");
    assert!(auth_check < upgrade, "authorization must complete before the upgrade");
}

#[test]
fn fanout_topics_come_from_the_connection_authorization() {
    assert!(
        WS_SOURCE.contains("into_fanout"),
        "inbound frames must be rebuilt before fan-out"
    );
    assert!(
        !WS_SOURCE.contains("frame.workspace"),
        "the client-supplied workspace field must never pick the topic"
    );
}
