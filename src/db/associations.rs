use super::accounts::account_by_id;
use super::client::{conflict_on_unique, db_err, DbClient};
use crate::types::{AppError, AssignmentOutcome, Association, AssociationType, Result};
use libsql::{params, Connection, Row};

const TYPE_TAKEN: &str = "Association type already exists";

const ASSOCIATION_SELECT: &str = "
    SELECT a.faculty_id, f.full_name, a.student_id, s.full_name, sp.roll_number,
           a.association_type_id, t.name
    FROM faculty_student_associations a
    JOIN user_accounts f ON f.user_id = a.faculty_id
    JOIN user_accounts s ON s.user_id = a.student_id
    JOIN association_types t ON t.association_type_id = a.association_type_id
    LEFT JOIN student_profiles sp ON sp.user_id = a.student_id";

fn association_from_row(row: &Row) -> Result<Association> {
    Ok(Association {
        faculty_id: row.get(0).map_err(db_err)?,
        faculty_name: row.get(1).map_err(db_err)?,
        student_id: row.get(2).map_err(db_err)?,
        student_name: row.get(3).map_err(db_err)?,
        roll_number: row.get(4).map_err(db_err)?,
        association_type_id: row.get(5).map_err(db_err)?,
        association_type: row.get(6).map_err(db_err)?,
    })
}

async fn association_type_by_id(
    conn: &Connection,
    association_type_id: i64,
) -> Result<Option<AssociationType>> {
    let mut rows = conn
        .query(
            "SELECT association_type_id, name FROM association_types
             WHERE association_type_id = ?",
            params![association_type_id],
        )
        .await
        .map_err(db_err)?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(AssociationType {
            association_type_id: row.get(0).map_err(db_err)?,
            name: row.get(1).map_err(db_err)?,
        })),
        None => Ok(None),
    }
}

/// Student holding `roll_number`, limited to `department_id` when given.
async fn student_by_roll(
    conn: &Connection,
    roll_number: &str,
    department_id: Option<i64>,
) -> Result<Option<i64>> {
    let mut rows = conn
        .query(
            "SELECT sp.user_id FROM student_profiles sp
             JOIN user_accounts u ON u.user_id = sp.user_id
             WHERE sp.roll_number = ? AND u.user_type = 'STUDENT'
               AND (? IS NULL OR sp.department_id = ?)",
            params![roll_number, department_id, department_id],
        )
        .await
        .map_err(db_err)?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(row.get::<i64>(0).map_err(db_err)?)),
        None => Ok(None),
    }
}

impl DbClient {
    // ============= Association types =============

    pub async fn list_association_types(&self) -> Result<Vec<AssociationType>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT association_type_id, name FROM association_types ORDER BY name",
                (),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list association types: {}", e)))?;

        let mut types = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            types.push(AssociationType {
                association_type_id: row.get(0).map_err(db_err)?,
                name: row.get(1).map_err(db_err)?,
            });
        }
        Ok(types)
    }

    pub async fn get_association_type(
        &self,
        association_type_id: i64,
    ) -> Result<Option<AssociationType>> {
        let conn = self.connection().await?;
        association_type_by_id(&conn, association_type_id).await
    }

    pub async fn create_association_type(&self, name: &str) -> Result<AssociationType> {
        let conn = self.writer().await?;
        conn.execute(
            "INSERT INTO association_types (name) VALUES (?)",
            params![name],
        )
        .await
        .map_err(|e| conflict_on_unique(e, TYPE_TAKEN))?;

        Ok(AssociationType {
            association_type_id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub async fn update_association_type(
        &self,
        association_type_id: i64,
        name: &str,
    ) -> Result<AssociationType> {
        let conn = self.writer().await?;
        let changed = conn
            .execute(
                "UPDATE association_types SET name = ? WHERE association_type_id = ?",
                params![name, association_type_id],
            )
            .await
            .map_err(|e| conflict_on_unique(e, TYPE_TAKEN))?;

        if changed == 0 {
            return Err(AppError::NotFound("Association type not found".to_string()));
        }
        Ok(AssociationType {
            association_type_id,
            name: name.to_string(),
        })
    }

    /// Refused with 409 while any association uses the type.
    pub async fn delete_association_type(&self, association_type_id: i64) -> Result<()> {
        let tx = self.begin().await?;
        let outcome = async {
            let mut rows = tx
                .query(
                    "SELECT COUNT(*) FROM faculty_student_associations
                     WHERE association_type_id = ?",
                    params![association_type_id],
                )
                .await
                .map_err(db_err)?;
            let in_use = match rows.next().await.map_err(db_err)? {
                Some(row) => row.get::<i64>(0).map_err(db_err)?,
                None => 0,
            };
            if in_use > 0 {
                return Err(AppError::Conflict(
                    "Association type is assigned to one or more students".to_string(),
                ));
            }

            let deleted = tx
                .execute(
                    "DELETE FROM association_types WHERE association_type_id = ?",
                    params![association_type_id],
                )
                .await
                .map_err(db_err)?;
            if deleted == 0 {
                return Err(AppError::NotFound("Association type not found".to_string()));
            }
            Ok(())
        }
        .await;
        self.finish(tx, outcome).await
    }

    // ============= Faculty-student associations =============

    /// Links a faculty member to every student in `roll_numbers` under one
    /// association type, in a single transaction.
    ///
    /// Unknown roll numbers and existing links are reported, not fatal. With
    /// `department_id` set, the faculty member and the students must belong
    /// to that department; students elsewhere read as not found.
    pub async fn assign_students(
        &self,
        faculty_id: i64,
        association_type_id: i64,
        roll_numbers: &[String],
        department_id: Option<i64>,
    ) -> Result<AssignmentOutcome> {
        let tx = self.begin().await?;
        let outcome = async {
            account_by_id(&tx, faculty_id)
                .await?
                .filter(|faculty| faculty.role.has_faculty_profile())
                .filter(|faculty| department_id.is_none() || faculty.department_id == department_id)
                .ok_or_else(|| AppError::NotFound("Faculty member not found".to_string()))?;
            association_type_by_id(&tx, association_type_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Association type not found".to_string()))?;

            let mut result = AssignmentOutcome::default();
            for roll_number in roll_numbers {
                let Some(student_id) = student_by_roll(&tx, roll_number, department_id).await?
                else {
                    result.not_found.push(roll_number.clone());
                    continue;
                };

                let inserted = tx
                    .execute(
                        "INSERT OR IGNORE INTO faculty_student_associations
                            (faculty_id, student_id, association_type_id)
                         VALUES (?, ?, ?)",
                        params![faculty_id, student_id, association_type_id],
                    )
                    .await
                    .map_err(db_err)?;
                if inserted == 0 {
                    result.already_assigned.push(roll_number.clone());
                } else {
                    result.assigned += 1;
                }
            }
            Ok(result)
        }
        .await;
        self.finish(tx, outcome).await
    }

    /// Associations, optionally for one faculty member and limited to the
    /// students of one department.
    pub async fn list_associations(
        &self,
        faculty_id: Option<i64>,
        department_id: Option<i64>,
    ) -> Result<Vec<Association>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "{} WHERE (? IS NULL OR a.faculty_id = ?)
                       AND (? IS NULL OR s.department_id = ?)
                     ORDER BY a.faculty_id, sp.roll_number, a.association_type_id",
                    ASSOCIATION_SELECT
                ),
                params![faculty_id, faculty_id, department_id, department_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list associations: {}", e)))?;

        let mut associations = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            associations.push(association_from_row(&row)?);
        }
        Ok(associations)
    }

    pub async fn remove_association(
        &self,
        faculty_id: i64,
        student_id: i64,
        association_type_id: i64,
        department_id: Option<i64>,
    ) -> Result<()> {
        let conn = self.writer().await?;
        let deleted = conn
            .execute(
                "DELETE FROM faculty_student_associations
                 WHERE faculty_id = ? AND student_id = ? AND association_type_id = ?
                   AND (? IS NULL OR student_id IN
                        (SELECT user_id FROM user_accounts WHERE department_id = ?))",
                params![
                    faculty_id,
                    student_id,
                    association_type_id,
                    department_id,
                    department_id
                ],
            )
            .await
            .map_err(db_err)?;

        if deleted == 0 {
            return Err(AppError::NotFound("Association not found".to_string()));
        }
        Ok(())
    }
}
