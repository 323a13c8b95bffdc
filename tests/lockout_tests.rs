use std::sync::Arc;
use std::time::Duration;

use wardline::auth::{AuthPolicy, AuthService, CredentialStore, LockoutPolicy, ManualClock};

const HOME_ADDR: &str = "203.0.113.9";
const OTHER_ADDR: &str = "203.0.113.77";

/// Service with two known accounts and a tight lockout policy: three
/// failures inside sixty seconds lock the key for two minutes.
fn service(clock: &ManualClock) -> AuthService {
    let mut credentials = CredentialStore::new();
    credentials.insert("admin", "1234");
    credentials.insert("medic", "sd2025");
    let policy = AuthPolicy {
        token_ttl: Duration::from_secs(600),
        lockout: LockoutPolicy {
            max_failures: 3,
            failure_window: Duration::from_secs(60),
            lock_duration: Duration::from_secs(120),
        },
    };
    AuthService::with_clock(credentials, policy, Arc::new(clock.clone()))
}

fn lock_out(auth: &AuthService, user: &str, addr: &str) {
    for _ in 0..3 {
        assert_eq!(
            auth.login(user, "definitely-wrong", addr),
            None,
            "failed attempts should not yield a token"
        );
    }
}

#[test]
fn test_lock_blocks_correct_credentials_until_it_expires() {
    let clock = ManualClock::new();
    let auth = service(&clock);

    lock_out(&auth, "admin", HOME_ADDR);
    assert!(auth.is_user_locked("admin"));
    assert!(auth.is_ip_locked(HOME_ADDR));

    // One second short of the deadline the right password still bounces.
    clock.advance(Duration::from_secs(119));
    assert_eq!(auth.login("admin", "1234", HOME_ADDR), None);

    clock.advance(Duration::from_secs(2));
    let token = auth
        .login("admin", "1234", HOME_ADDR)
        .expect("login should succeed once the lock lapses");
    assert!(auth.validate(&token));
}

#[test]
fn test_user_and_address_locks_are_separate_keys() {
    let clock = ManualClock::new();
    let auth = service(&clock);

    lock_out(&auth, "admin", HOME_ADDR);

    // A different account from the locked address is refused.
    assert_eq!(auth.login("medic", "sd2025", HOME_ADDR), None);
    // The locked account from a clean address is refused too.
    assert_eq!(auth.login("admin", "1234", OTHER_ADDR), None);
    // A clean account from a clean address goes through.
    assert!(auth.login("medic", "sd2025", OTHER_ADDR).is_some());
}

#[test]
fn test_unknown_users_still_trip_the_address_lock() {
    let clock = ManualClock::new();
    let auth = service(&clock);

    lock_out(&auth, "ghost", HOME_ADDR);
    assert!(auth.is_ip_locked(HOME_ADDR));

    // The address lock now refuses a real account with the right password.
    assert_eq!(auth.login("admin", "1234", HOME_ADDR), None);
    assert!(auth.login("admin", "1234", OTHER_ADDR).is_some());
}

#[test]
fn test_attempts_during_a_lock_do_not_extend_it() {
    let clock = ManualClock::new();
    let auth = service(&clock);

    lock_out(&auth, "admin", HOME_ADDR);

    // Hammering the locked account halfway through changes nothing.
    clock.advance(Duration::from_secs(60));
    for _ in 0..5 {
        assert_eq!(auth.login("admin", "1234", HOME_ADDR), None);
    }
    assert_eq!(
        auth.user_locked_remaining("admin"),
        Some(Duration::from_secs(60))
    );

    clock.advance(Duration::from_secs(61));
    assert!(auth.login("admin", "1234", HOME_ADDR).is_some());
}

#[test]
fn test_remaining_lock_time_counts_down() {
    let clock = ManualClock::new();
    let auth = service(&clock);

    lock_out(&auth, "admin", HOME_ADDR);
    assert_eq!(
        auth.ip_locked_remaining(HOME_ADDR),
        Some(Duration::from_secs(120))
    );

    clock.advance(Duration::from_secs(30));
    assert_eq!(
        auth.ip_locked_remaining(HOME_ADDR),
        Some(Duration::from_secs(90))
    );

    clock.advance(Duration::from_secs(90));
    assert_eq!(auth.ip_locked_remaining(HOME_ADDR), None);
}

#[test]
fn test_stale_failures_fall_out_of_the_window() {
    let clock = ManualClock::new();
    let auth = service(&clock);

    assert_eq!(auth.login("admin", "wrong", HOME_ADDR), None);
    assert_eq!(auth.login("admin", "wrong", HOME_ADDR), None);

    // Once the counting window lapses the slate is clean again.
    clock.advance(Duration::from_secs(61));
    assert_eq!(auth.login("admin", "wrong", HOME_ADDR), None);
    assert_eq!(auth.login("admin", "wrong", HOME_ADDR), None);
    assert!(!auth.is_user_locked("admin"));

    let token = auth
        .login("admin", "1234", HOME_ADDR)
        .expect("two recent failures should not lock the account");
    assert!(auth.validate(&token));
}

#[test]
fn test_success_resets_both_counters() {
    let clock = ManualClock::new();
    let auth = service(&clock);

    auth.login("admin", "wrong", HOME_ADDR);
    auth.login("admin", "wrong", HOME_ADDR);
    assert!(auth.login("admin", "1234", HOME_ADDR).is_some());

    // The next two failures count from zero, so no lock trips.
    auth.login("admin", "wrong", HOME_ADDR);
    auth.login("admin", "wrong", HOME_ADDR);
    assert!(!auth.is_user_locked("admin"));
    assert!(!auth.is_ip_locked(HOME_ADDR));
    assert!(auth.login("admin", "1234", HOME_ADDR).is_some());
}
