use actix_web::{dev::Payload, test as actix_test, FromRequest};
use cib::{
    auth::{create_jwt, hash_password, verify_password, Auth, Claims, Role},
    require_role,
};
use std::env;

// Helper that guarantees a sufficiently long secret for tests.
fn set_secret() {
    env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

#[actix_web::test]
async fn jwt_roundtrip_ok() {
    set_secret();
    let token = create_jwt(42, "tester", Role::User).expect("token");
    // The Auth extractor is the public way to validate, so use it here.
    let req = actix_test::TestRequest::default()
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_http_request();
    let mut pl = Payload::None;
    let auth = Auth::from_request(&req, &mut pl).await.expect("extract");
    assert_eq!(auth.0.sub, 42);
    assert_eq!(auth.0.username, "tester");
    assert_eq!(auth.0.role, Role::User);
}

#[actix_web::test]
async fn extractor_rejects_invalid_token() {
    set_secret();
    let req = actix_test::TestRequest::default()
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
async fn extractor_rejects_missing_header() {
    set_secret();
    let req = actix_test::TestRequest::default().to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
async fn require_role_macro_enforces_roles() {
    // Build Auth instances manually with different roles.
    let admin = Auth(Claims {
        sub: 1,
        username: "a".into(),
        role: Role::Admin,
        exp: usize::MAX,
    });
    let user = Auth(Claims {
        sub: 2,
        username: "u".into(),
        role: Role::User,
        exp: usize::MAX,
    });

    fn guarded(a: Auth) -> actix_web::Result<()> {
        require_role!(a, Role::Admin);
        Ok(())
    }
    assert!(guarded(admin).is_ok());
    assert!(guarded(user).is_err());
}

#[test]
fn password_hash_roundtrip() {
    let hash = hash_password("hunter2...").expect("hash");
    assert!(hash.starts_with("$argon2"));
    assert!(verify_password("hunter2...", &hash));
    assert!(!verify_password("hunter3...", &hash));
    // garbage stored hash never verifies
    assert!(!verify_password("hunter2...", "not-a-phc-string"));
}

#[test]
fn identity_maps_claims() {
    let claims = Claims {
        sub: 7,
        username: "x".into(),
        role: Role::Admin,
        exp: usize::MAX,
    };
    let id = claims.identity();
    assert_eq!(id.user_id, 7);
    assert!(id.is_admin());
}
