use super::accounts::{account_by_email, insert_account, sync_profile};
use super::client::{conflict_on_unique, db_err, DbClient};
use crate::auth::password::default_password_hash;
use crate::types::{AppError, DepartmentView, NewAccount, Result, Role};
use libsql::{params, Connection, Row};

const CODE_TAKEN: &str = "Department code already exists";

const DEPARTMENT_SELECT: &str = "
    SELECT d.department_id, d.department_code, d.department_name, h.full_name, h.email
    FROM departments d
    LEFT JOIN user_accounts h
        ON h.department_id = d.department_id AND h.user_type = 'HOD'";

/// Who should head a department. `name` is only used when no account with
/// `email` exists yet.
#[derive(Debug, Clone)]
pub struct HodAssignment {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DepartmentChanges {
    pub department_code: Option<String>,
    pub department_name: Option<String>,
    pub hod: Option<HodAssignment>,
}

fn department_from_row(row: &Row) -> Result<DepartmentView> {
    Ok(DepartmentView {
        department_id: row.get(0).map_err(db_err)?,
        department_code: row.get(1).map_err(db_err)?,
        department_name: row.get(2).map_err(db_err)?,
        hod_name: row.get(3).map_err(db_err)?,
        hod_email: row.get(4).map_err(db_err)?,
    })
}

async fn department_by_id(conn: &Connection, department_id: i64) -> Result<Option<DepartmentView>> {
    let mut rows = conn
        .query(
            &format!("{} WHERE d.department_id = ?", DEPARTMENT_SELECT),
            params![department_id],
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to query department: {}", e)))?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(department_from_row(&row)?)),
        None => Ok(None),
    }
}

async fn code_in_use(conn: &Connection, code: &str, except: Option<i64>) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM departments WHERE department_code = ? AND department_id != ?",
            params![code, except.unwrap_or(-1)],
        )
        .await
        .map_err(db_err)?;
    Ok(rows.next().await.map_err(db_err)?.is_some())
}

/// Makes the account behind `hod.email` the department's HOD.
///
/// The previous HOD is demoted to FACULTY. An unknown email creates a new HOD
/// account with the default password; an ADMIN account cannot be promoted.
async fn assign_hod(conn: &Connection, department_id: i64, hod: &HodAssignment) -> Result<i64> {
    let existing = account_by_email(conn, &hod.email).await?;
    if let Some(account) = &existing {
        if account.role == Role::Admin {
            return Err(AppError::Conflict(
                "An admin account cannot be assigned as HOD".to_string(),
            ));
        }
        if account.role == Role::Hod && account.department_id == Some(department_id) {
            return Ok(account.user_id);
        }
    }

    let mut rows = conn
        .query(
            "SELECT user_id FROM user_accounts WHERE department_id = ? AND user_type = 'HOD'",
            params![department_id],
        )
        .await
        .map_err(db_err)?;
    let mut previous = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_err)? {
        previous.push(row.get::<i64>(0).map_err(db_err)?);
    }
    for user_id in previous {
        conn.execute(
            "UPDATE user_accounts SET user_type = 'FACULTY' WHERE user_id = ?",
            params![user_id],
        )
        .await
        .map_err(db_err)?;
        sync_profile(conn, user_id, Role::Faculty, Some(department_id), None).await?;
        tracing::info!(user_id, department_id, "previous HOD demoted to FACULTY");
    }

    match existing {
        Some(account) => {
            conn.execute(
                "UPDATE user_accounts SET user_type = 'HOD', department_id = ? WHERE user_id = ?",
                params![department_id, account.user_id],
            )
            .await
            .map_err(db_err)?;
            sync_profile(conn, account.user_id, Role::Hod, Some(department_id), None).await?;
            Ok(account.user_id)
        }
        None => {
            let full_name = hod
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    AppError::Validation("Field 'hod_name' is required for a new HOD".to_string())
                })?;
            let new = NewAccount {
                full_name: full_name.to_string(),
                email: hod.email.clone(),
                password_hash: default_password_hash(&hod.email)?,
                role: Role::Hod,
                department_id: Some(department_id),
                batch_id: None,
                roll_number: None,
            };
            insert_account(conn, &new).await
        }
    }
}

async fn count(conn: &Connection, sql: &str, id: i64) -> Result<i64> {
    let mut rows = conn.query(sql, params![id]).await.map_err(db_err)?;
    match rows.next().await.map_err(db_err)? {
        Some(row) => row.get::<i64>(0).map_err(db_err),
        None => Ok(0),
    }
}

impl DbClient {
    pub async fn list_departments(&self) -> Result<Vec<DepartmentView>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(&format!("{} ORDER BY d.department_code", DEPARTMENT_SELECT), ())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list departments: {}", e)))?;

        let mut departments = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            departments.push(department_from_row(&row)?);
        }
        Ok(departments)
    }

    pub async fn get_department(&self, department_id: i64) -> Result<Option<DepartmentView>> {
        let conn = self.connection().await?;
        department_by_id(&conn, department_id).await
    }

    pub async fn count_departments(&self) -> Result<i64> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM departments", ())
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>(0).map_err(db_err),
            None => Ok(0),
        }
    }

    /// Creates a department and installs its HOD in one transaction.
    pub async fn create_department(
        &self,
        code: &str,
        name: &str,
        hod: HodAssignment,
    ) -> Result<DepartmentView> {
        let tx = self.begin().await?;
        let outcome = async {
            if code_in_use(&tx, code, None).await? {
                return Err(AppError::Conflict(CODE_TAKEN.to_string()));
            }
            tx.execute(
                "INSERT INTO departments (department_code, department_name) VALUES (?, ?)",
                params![code, name],
            )
            .await
            .map_err(|e| conflict_on_unique(e, CODE_TAKEN))?;
            let department_id = tx.last_insert_rowid();

            assign_hod(&tx, department_id, &hod).await?;

            department_by_id(&tx, department_id)
                .await?
                .ok_or_else(|| AppError::Internal("Created department vanished".to_string()))
        }
        .await;
        self.finish(tx, outcome).await
    }

    pub async fn update_department(
        &self,
        department_id: i64,
        changes: DepartmentChanges,
    ) -> Result<DepartmentView> {
        let tx = self.begin().await?;
        let outcome = async {
            let current = department_by_id(&tx, department_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Department not found".to_string()))?;

            if let Some(code) = &changes.department_code {
                if code_in_use(&tx, code, Some(department_id)).await? {
                    return Err(AppError::Conflict(CODE_TAKEN.to_string()));
                }
            }

            tx.execute(
                "UPDATE departments SET department_code = ?, department_name = ?
                 WHERE department_id = ?",
                params![
                    changes
                        .department_code
                        .as_deref()
                        .unwrap_or(&current.department_code),
                    changes
                        .department_name
                        .as_deref()
                        .unwrap_or(&current.department_name),
                    department_id
                ],
            )
            .await
            .map_err(|e| conflict_on_unique(e, CODE_TAKEN))?;

            if let Some(hod) = &changes.hod {
                assign_hod(&tx, department_id, hod).await?;
            }

            department_by_id(&tx, department_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Department not found".to_string()))
        }
        .await;
        self.finish(tx, outcome).await
    }

    /// Deletes a department nothing references any more.
    pub async fn delete_department(&self, department_id: i64) -> Result<()> {
        let tx = self.begin().await?;
        let outcome = async {
            let accounts = count(
                &tx,
                "SELECT COUNT(*) FROM user_accounts WHERE department_id = ?",
                department_id,
            )
            .await?;
            let programmes = count(
                &tx,
                "SELECT COUNT(*) FROM programmes WHERE department_id = ?",
                department_id,
            )
            .await?;
            if accounts > 0 || programmes > 0 {
                return Err(AppError::Conflict(
                    "Department still has accounts or programmes".to_string(),
                ));
            }

            let deleted = tx
                .execute(
                    "DELETE FROM departments WHERE department_id = ?",
                    params![department_id],
                )
                .await
                .map_err(db_err)?;
            if deleted == 0 {
                return Err(AppError::NotFound("Department not found".to_string()));
            }
            Ok(())
        }
        .await;
        self.finish(tx, outcome).await
    }
}
