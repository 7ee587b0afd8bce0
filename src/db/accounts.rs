use super::client::{conflict_on_unique, db_err, DbClient};
use crate::types::{
    Account, AccountChanges, AppError, NewAccount, PersonalDetails, Result, Role, StudentProfile,
};
use chrono::Utc;
use libsql::{params, Connection, Row};

const ACCOUNT_COLUMNS: &str = "user_id, full_name, email, password_hash, user_type, \
                               department_id, is_active, created_at";

const EMAIL_TAKEN: &str = "Email already exists";
const ROLL_NUMBER_TAKEN: &str = "Roll number already exists";
pub(crate) const EMAIL_IN_USE: &str = "This email address is already in use by another account";

const STUDENT_PROFILE_COLUMNS: &str = "user_id, department_id, batch_id, roll_number, date_of_birth, \
                                       phone_number_self, phone_number_guardian, current_address, \
                                       permanent_address";

fn student_profile_from_row(row: &Row) -> Result<StudentProfile> {
    Ok(StudentProfile {
        user_id: row.get(0).map_err(db_err)?,
        department_id: row.get(1).map_err(db_err)?,
        batch_id: row.get(2).map_err(db_err)?,
        roll_number: row.get(3).map_err(db_err)?,
        date_of_birth: row.get(4).map_err(db_err)?,
        phone_number_self: row.get(5).map_err(db_err)?,
        phone_number_guardian: row.get(6).map_err(db_err)?,
        current_address: row.get(7).map_err(db_err)?,
        permanent_address: row.get(8).map_err(db_err)?,
    })
}

pub(crate) async fn student_profile_by_id(
    conn: &Connection,
    user_id: i64,
) -> Result<Option<StudentProfile>> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {} FROM student_profiles WHERE user_id = ?",
                STUDENT_PROFILE_COLUMNS
            ),
            params![user_id],
        )
        .await
        .map_err(db_err)?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(student_profile_from_row(&row)?)),
        None => Ok(None),
    }
}

fn blank_to_null(value: &str) -> Option<&str> {
    Some(value).filter(|value| !value.is_empty())
}

fn account_from_row(row: &Row) -> Result<Account> {
    let role: String = row.get(4).map_err(db_err)?;

    Ok(Account {
        user_id: row.get(0).map_err(db_err)?,
        full_name: row.get(1).map_err(db_err)?,
        email: row.get(2).map_err(db_err)?,
        password_hash: row.get(3).map_err(db_err)?,
        role: role
            .parse()
            .map_err(|_| AppError::Database(format!("Unknown user_type '{}' in store", role)))?,
        department_id: row.get(5).map_err(db_err)?,
        is_active: row.get::<i64>(6).map_err(db_err)? != 0,
        created_at: row.get(7).map_err(db_err)?,
    })
}

async fn collect_accounts(mut rows: libsql::Rows) -> Result<Vec<Account>> {
    let mut accounts = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_err)? {
        accounts.push(account_from_row(&row)?);
    }
    Ok(accounts)
}

pub(crate) async fn account_by_id(conn: &Connection, user_id: i64) -> Result<Option<Account>> {
    let mut rows = conn
        .query(
            &format!("SELECT {} FROM user_accounts WHERE user_id = ?", ACCOUNT_COLUMNS),
            params![user_id],
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to query account: {}", e)))?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(account_from_row(&row)?)),
        None => Ok(None),
    }
}

pub(crate) async fn account_by_email(conn: &Connection, email: &str) -> Result<Option<Account>> {
    let mut rows = conn
        .query(
            &format!("SELECT {} FROM user_accounts WHERE email = ?", ACCOUNT_COLUMNS),
            params![email],
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to query account: {}", e)))?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(account_from_row(&row)?)),
        None => Ok(None),
    }
}

/// Whether `email` belongs to an account other than `except`.
pub(crate) async fn email_in_use(
    conn: &Connection,
    email: &str,
    except: Option<i64>,
) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM user_accounts WHERE email = ? AND user_id != ?",
            params![email, except.unwrap_or(-1)],
        )
        .await
        .map_err(db_err)?;

    Ok(rows.next().await.map_err(db_err)?.is_some())
}

pub(crate) async fn insert_account(conn: &Connection, new: &NewAccount) -> Result<i64> {
    if email_in_use(conn, &new.email, None).await? {
        return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
    }

    conn.execute(
        "INSERT INTO user_accounts
            (full_name, email, password_hash, user_type, department_id, is_active, created_at)
         VALUES (?, ?, ?, ?, ?, 1, ?)",
        params![
            new.full_name.as_str(),
            new.email.as_str(),
            new.password_hash.as_str(),
            new.role.as_str(),
            new.department_id,
            Utc::now().timestamp()
        ],
    )
    .await
    .map_err(|e| conflict_on_unique(e, EMAIL_TAKEN))?;

    let user_id = conn.last_insert_rowid();
    sync_profile(conn, user_id, new.role, new.department_id, new.batch_id).await?;
    if let Some(roll_number) = &new.roll_number {
        set_roll_number(conn, user_id, new.role, roll_number).await?;
    }

    Ok(user_id)
}

/// Sets or, when blank, clears a student's roll number.
async fn set_roll_number(conn: &Connection, user_id: i64, role: Role, roll_number: &str) -> Result<()> {
    let roll_number = blank_to_null(roll_number.trim());
    if !role.has_student_profile() {
        return match roll_number {
            None => Ok(()),
            Some(_) => Err(AppError::Validation(
                "Only STUDENT accounts have a roll number".to_string(),
            )),
        };
    }

    conn.execute(
        "UPDATE student_profiles SET roll_number = ? WHERE user_id = ?",
        params![roll_number, user_id],
    )
    .await
    .map_err(|e| conflict_on_unique(e, ROLL_NUMBER_TAKEN))?;
    Ok(())
}

/// Brings the account's profile rows in line with its role.
///
/// HOD and FACULTY own a faculty profile, STUDENT owns a student profile,
/// every other role owns none. A profile the role keeps is updated in place,
/// so a student's own details survive a batch or department move. Losing a
/// profile also drops the associations made through it.
pub(crate) async fn sync_profile(
    conn: &Connection,
    user_id: i64,
    role: Role,
    department_id: Option<i64>,
    batch_id: Option<i64>,
) -> Result<()> {
    if !role.has_faculty_profile() {
        conn.execute("DELETE FROM faculty_profiles WHERE user_id = ?", params![user_id])
            .await
            .map_err(db_err)?;
        conn.execute(
            "DELETE FROM faculty_student_associations WHERE faculty_id = ?",
            params![user_id],
        )
        .await
        .map_err(db_err)?;
    }
    if !role.has_student_profile() {
        conn.execute("DELETE FROM student_profiles WHERE user_id = ?", params![user_id])
            .await
            .map_err(db_err)?;
        conn.execute(
            "DELETE FROM faculty_student_associations WHERE student_id = ?",
            params![user_id],
        )
        .await
        .map_err(db_err)?;
    }

    if !role.has_faculty_profile() && !role.has_student_profile() {
        return Ok(());
    }

    let department_id = department_id.ok_or_else(|| {
        AppError::Validation(format!("A {} account requires a department", role))
    })?;

    if role.has_faculty_profile() {
        conn.execute(
            "INSERT INTO faculty_profiles (user_id, department_id) VALUES (?, ?)
             ON CONFLICT (user_id) DO UPDATE SET department_id = excluded.department_id",
            params![user_id, department_id],
        )
        .await
        .map_err(db_err)?;
    } else {
        conn.execute(
            "INSERT INTO student_profiles (user_id, department_id, batch_id) VALUES (?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE
             SET department_id = excluded.department_id, batch_id = excluded.batch_id",
            params![user_id, department_id, batch_id],
        )
        .await
        .map_err(db_err)?;
    }

    Ok(())
}

pub(crate) async fn student_batch(conn: &Connection, user_id: i64) -> Result<Option<i64>> {
    let mut rows = conn
        .query(
            "SELECT batch_id FROM student_profiles WHERE user_id = ?",
            params![user_id],
        )
        .await
        .map_err(db_err)?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => row.get::<Option<i64>>(0).map_err(db_err),
        None => Ok(None),
    }
}

async fn apply_changes(conn: &Connection, user_id: i64, changes: &AccountChanges) -> Result<Account> {
    let current = account_by_id(conn, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(email) = &changes.email {
        if email_in_use(conn, email, Some(user_id)).await? {
            return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
        }
    }

    let role = changes.role.unwrap_or(current.role);
    let department_id = if role == Role::Admin {
        None
    } else {
        changes.department_id.or(current.department_id)
    };

    conn.execute(
        "UPDATE user_accounts
         SET full_name = ?, email = ?, password_hash = ?, user_type = ?, department_id = ?
         WHERE user_id = ?",
        params![
            changes.full_name.as_deref().unwrap_or(&current.full_name),
            changes.email.as_deref().unwrap_or(&current.email),
            changes
                .password_hash
                .as_deref()
                .unwrap_or(&current.password_hash),
            role.as_str(),
            department_id,
            user_id
        ],
    )
    .await
    .map_err(|e| conflict_on_unique(e, EMAIL_TAKEN))?;

    let profile_changed = role != current.role
        || department_id != current.department_id
        || changes.batch_id.is_some();
    if profile_changed {
        let batch_id = match changes.batch_id {
            Some(batch_id) => Some(batch_id),
            None if role == current.role => student_batch(conn, user_id).await?,
            None => None,
        };
        sync_profile(conn, user_id, role, department_id, batch_id).await?;
    }
    if let Some(roll_number) = &changes.roll_number {
        set_roll_number(conn, user_id, role, roll_number).await?;
    }

    account_by_id(conn, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

impl DbClient {
    pub async fn get_account(&self, user_id: i64) -> Result<Option<Account>> {
        let conn = self.connection().await?;
        account_by_id(&conn, user_id).await
    }

    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.connection().await?;
        account_by_email(&conn, email).await
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.connection().await?;
        let rows = conn
            .query(
                &format!("SELECT {} FROM user_accounts ORDER BY user_id", ACCOUNT_COLUMNS),
                (),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list accounts: {}", e)))?;

        collect_accounts(rows).await
    }

    /// Accounts a HOD manages: FACULTY, STAFF and STUDENT in one department.
    pub async fn list_department_accounts(&self, department_id: i64) -> Result<Vec<Account>> {
        let conn = self.connection().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM user_accounts
                     WHERE department_id = ? AND user_type IN ('FACULTY', 'STAFF', 'STUDENT')
                     ORDER BY user_id",
                    ACCOUNT_COLUMNS
                ),
                params![department_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list accounts: {}", e)))?;

        collect_accounts(rows).await
    }

    pub async fn count_accounts_by_role(&self, role: Role) -> Result<i64> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM user_accounts WHERE user_type = ?",
                params![role.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>(0).map_err(db_err),
            None => Ok(0),
        }
    }

    /// Creates an account together with the profile its role requires.
    pub async fn create_account(&self, new: NewAccount) -> Result<Account> {
        let tx = self.begin().await?;
        let outcome = async {
            let user_id = insert_account(&tx, &new).await?;
            account_by_id(&tx, user_id)
                .await?
                .ok_or_else(|| AppError::Internal("Created account vanished".to_string()))
        }
        .await;
        self.finish(tx, outcome).await
    }

    /// Creates every account in `rows` or none of them.
    pub async fn create_accounts(&self, rows: Vec<NewAccount>) -> Result<Vec<i64>> {
        let tx = self.begin().await?;
        let outcome = async {
            let mut ids = Vec::with_capacity(rows.len());
            for new in &rows {
                ids.push(insert_account(&tx, new).await?);
            }
            Ok(ids)
        }
        .await;
        self.finish(tx, outcome).await
    }

    /// Applies field changes; a role, department or batch change migrates the
    /// profile rows in the same transaction.
    pub async fn update_account(&self, user_id: i64, changes: AccountChanges) -> Result<Account> {
        let tx = self.begin().await?;
        let outcome = apply_changes(&tx, user_id, &changes).await;
        self.finish(tx, outcome).await
    }

    pub async fn roll_number_exists(&self, roll_number: &str) -> Result<bool> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM student_profiles WHERE roll_number = ?",
                params![roll_number],
            )
            .await
            .map_err(db_err)?;

        Ok(rows.next().await.map_err(db_err)?.is_some())
    }

    pub async fn get_student_profile(&self, user_id: i64) -> Result<Option<StudentProfile>> {
        let conn = self.connection().await?;
        student_profile_by_id(&conn, user_id).await
    }

    /// Saves a student's own details together with their email and, when
    /// given, a new password. Either everything is written or nothing is.
    pub async fn update_student_personal(
        &self,
        user_id: i64,
        details: &PersonalDetails,
        email: &str,
        password_hash: Option<String>,
    ) -> Result<StudentProfile> {
        let tx = self.begin().await?;
        let outcome = async {
            let account = account_by_id(&tx, user_id)
                .await?
                .filter(|account| account.role == Role::Student)
                .ok_or_else(|| AppError::NotFound("Student not found".to_string()))?;
            if email_in_use(&tx, email, Some(user_id)).await? {
                return Err(AppError::Conflict(EMAIL_IN_USE.to_string()));
            }

            if student_profile_by_id(&tx, user_id).await?.is_none() {
                sync_profile(&tx, user_id, Role::Student, account.department_id, None).await?;
            }
            tx.execute(
                "UPDATE student_profiles
                 SET date_of_birth = ?, phone_number_self = ?, phone_number_guardian = ?,
                     current_address = ?, permanent_address = ?
                 WHERE user_id = ?",
                params![
                    blank_to_null(&details.date_of_birth),
                    blank_to_null(&details.phone_number_self),
                    blank_to_null(&details.phone_number_guardian),
                    blank_to_null(&details.current_address),
                    blank_to_null(&details.permanent_address),
                    user_id
                ],
            )
            .await
            .map_err(db_err)?;

            apply_changes(
                &tx,
                user_id,
                &AccountChanges {
                    email: Some(email.to_string()),
                    password_hash,
                    ..AccountChanges::default()
                },
            )
            .await
            .map_err(|err| match err {
                AppError::Conflict(_) => AppError::Conflict(EMAIL_IN_USE.to_string()),
                other => other,
            })?;

            student_profile_by_id(&tx, user_id)
                .await?
                .ok_or_else(|| AppError::Internal("Student profile vanished".to_string()))
        }
        .await;
        self.finish(tx, outcome).await
    }

    pub async fn set_account_active(&self, user_id: i64, active: bool) -> Result<()> {
        let conn = self.writer().await?;
        let changed = conn
            .execute(
                "UPDATE user_accounts SET is_active = ? WHERE user_id = ?",
                params![active as i64, user_id],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    /// Activates the listed accounts that belong to `department_id` and are
    /// department-managed roles. Returns how many rows changed.
    pub async fn activate_department_accounts(
        &self,
        department_id: i64,
        user_ids: &[i64],
    ) -> Result<u64> {
        let tx = self.begin().await?;
        let outcome = async {
            let mut changed = 0;
            for user_id in user_ids {
                changed += tx
                    .execute(
                        "UPDATE user_accounts SET is_active = 1
                         WHERE user_id = ? AND department_id = ?
                           AND user_type IN ('FACULTY', 'STAFF', 'STUDENT')",
                        params![*user_id, department_id],
                    )
                    .await
                    .map_err(db_err)?;
            }
            Ok(changed)
        }
        .await;
        self.finish(tx, outcome).await
    }

    /// Hard delete; profiles go with the account through `ON DELETE CASCADE`.
    pub async fn delete_account(&self, user_id: i64) -> Result<()> {
        let conn = self.writer().await?;
        let deleted = conn
            .execute("DELETE FROM user_accounts WHERE user_id = ?", params![user_id])
            .await
            .map_err(db_err)?;

        if deleted == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    pub async fn has_faculty_profile(&self, user_id: i64) -> Result<bool> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM faculty_profiles WHERE user_id = ?",
                params![user_id],
            )
            .await
            .map_err(db_err)?;
        Ok(rows.next().await.map_err(db_err)?.is_some())
    }

    pub async fn has_student_profile(&self, user_id: i64) -> Result<bool> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM student_profiles WHERE user_id = ?",
                params![user_id],
            )
            .await
            .map_err(db_err)?;
        Ok(rows.next().await.map_err(db_err)?.is_some())
    }
}
