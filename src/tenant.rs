//! Task-local binding of the active tenant's database name.
//!
//! Handlers are many and shallow; the tenant travels as an ambient binding
//! so stored-procedure wrappers stay trivial. The binding is scoped to the
//! current task: concurrent requests never observe each other's tenant.

use std::future::Future;

use crate::error::AppError;

tokio::task_local! {
    static TENANT_DB: String;
}

/// Default name of the master catalog database.
pub const DEFAULT_MAIN_DB: &str = "pardaaf_main";

/// Run `fut` with the tenant binding set to `db_name`.
///
/// Bindings nest: a fan-out job bound to the main database rebinds per
/// tenant, and the outer binding is restored when the inner scope ends.
pub async fn with_tenant<F>(db_name: String, fut: F) -> F::Output
where
    F: Future,
{
    TENANT_DB.scope(db_name, fut).await
}

/// The database name bound to the current task.
pub fn current() -> Result<String, AppError> {
    TENANT_DB
        .try_with(|db| db.clone())
        .map_err(|_| AppError::ContextNotBound)
}
