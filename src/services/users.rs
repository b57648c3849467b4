use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, User};
use crate::store::Store;
use crate::utils::{hash_password, verify_password};

pub async fn register<S: Store + ?Sized>(store: &S, name: &str, email: &str, password: &str) -> AppResult<User> {
    let name = name.trim();
    let email = email.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if !email.contains('@') {
        return Err(AppError::bad_request("invalid email address"));
    }

    let user = DbUser::new(name, email, Some(hash_password(password)?));
    store.insert_user(&user).await?;
    Ok(user.into())
}

pub async fn authenticate<S: Store + ?Sized>(store: &S, email: &str, password: &str) -> AppResult<User> {
    let user = store
        .find_user_by_email(&email.trim().to_ascii_lowercase())
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    // Accounts without a password sign in through an external provider.
    let hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;
    if !verify_password(password, hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    Ok(user.into())
}

pub async fn find_user<S: Store + ?Sized>(store: &S, user_id: Uuid) -> AppResult<User> {
    store
        .find_user(user_id)
        .await?
        .map(User::from)
        .ok_or_else(|| AppError::not_found("user not found"))
}
