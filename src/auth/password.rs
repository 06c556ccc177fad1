use actix_web::web;

use crate::error::AppResult;

/// Hashes a password with bcrypt on the blocking thread pool.
pub async fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    let password = password.to_owned();
    let hashed = web::block(move || bcrypt::hash(password, cost)).await??;
    Ok(hashed)
}

/// Checks a password against a stored bcrypt hash on the blocking thread pool.
pub async fn verify_password(password: &str, hashed_password: &str) -> AppResult<bool> {
    let password = password.to_owned();
    let hashed_password = hashed_password.to_owned();
    let matches = web::block(move || bcrypt::verify(password, &hashed_password)).await??;
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    const TEST_COST: u32 = 4;

    #[actix_rt::test]
    async fn test_password_hashing_and_verification() {
        let password = "test_password123";
        let hashed = hash_password(password, TEST_COST).await.unwrap();

        assert_ne!(hashed, password);
        assert!(verify_password(password, &hashed).await.unwrap());
        assert!(!verify_password("wrong_password", &hashed).await.unwrap());
    }

    #[actix_rt::test]
    async fn test_verify_with_invalid_hash() {
        match verify_password("test_password123", "invalidhashformat").await {
            Err(AppError::InternalServerError(_)) | Ok(false) => {}
            Ok(true) => panic!("Password verification should fail for invalid hash format"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
