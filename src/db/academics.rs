use super::client::{conflict_on_unique, db_err, DbClient};
use crate::types::{
    AppError, Batch, BatchChanges, DegreeLevel, Programme, ProgrammeChanges, Result, Semester,
};
use libsql::{params, Connection, Row};

const DEGREE_TAKEN: &str = "Degree level already exists";
const PROGRAMME_TAKEN: &str = "Programme name already exists";
const BATCH_TAKEN: &str = "Batch name already exists for this programme";

const PROGRAMME_SELECT: &str = "
    SELECT p.programme_id, p.programme_name, p.degree_level_id, d.level_name,
           p.minimum_duration_years, p.maximum_duration_years, p.department_id, p.is_active
    FROM programmes p
    LEFT JOIN degree_levels d ON d.degree_level_id = p.degree_level_id";

const BATCH_SELECT: &str = "
    SELECT b.batch_id, b.programme_id, p.programme_name, b.department_id, b.batch_name,
           b.start_year, b.start_semester, b.is_active
    FROM batches b
    LEFT JOIN programmes p ON p.programme_id = b.programme_id";

#[derive(Debug, Clone)]
pub struct NewProgramme {
    pub programme_name: String,
    pub degree_level_id: i64,
    pub minimum_duration_years: i64,
    pub maximum_duration_years: Option<i64>,
    pub department_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewBatch {
    pub programme_id: i64,
    pub department_id: i64,
    pub batch_name: String,
    pub start_year: i64,
    pub start_semester: Semester,
}

fn programme_from_row(row: &Row) -> Result<Programme> {
    Ok(Programme {
        programme_id: row.get(0).map_err(db_err)?,
        programme_name: row.get(1).map_err(db_err)?,
        degree_level_id: row.get(2).map_err(db_err)?,
        degree_level: row.get(3).map_err(db_err)?,
        minimum_duration_years: row.get(4).map_err(db_err)?,
        maximum_duration_years: row.get(5).map_err(db_err)?,
        department_id: row.get(6).map_err(db_err)?,
        is_active: row.get::<i64>(7).map_err(db_err)? != 0,
    })
}

fn batch_from_row(row: &Row) -> Result<Batch> {
    let semester: String = row.get(6).map_err(db_err)?;

    Ok(Batch {
        batch_id: row.get(0).map_err(db_err)?,
        programme_id: row.get(1).map_err(db_err)?,
        programme_name: row.get(2).map_err(db_err)?,
        department_id: row.get(3).map_err(db_err)?,
        batch_name: row.get(4).map_err(db_err)?,
        start_year: row.get(5).map_err(db_err)?,
        start_semester: semester
            .parse()
            .map_err(|_| AppError::Database(format!("Unknown semester '{}' in store", semester)))?,
        is_active: row.get::<i64>(7).map_err(db_err)? != 0,
    })
}

async fn scalar(conn: &Connection, sql: &str, id: i64) -> Result<i64> {
    let mut rows = conn.query(sql, params![id]).await.map_err(db_err)?;
    match rows.next().await.map_err(db_err)? {
        Some(row) => row.get::<i64>(0).map_err(db_err),
        None => Ok(0),
    }
}

async fn programme_by_id(conn: &Connection, programme_id: i64) -> Result<Option<Programme>> {
    let mut rows = conn
        .query(
            &format!("{} WHERE p.programme_id = ?", PROGRAMME_SELECT),
            params![programme_id],
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to query programme: {}", e)))?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(programme_from_row(&row)?)),
        None => Ok(None),
    }
}

async fn batch_by_id(conn: &Connection, batch_id: i64) -> Result<Option<Batch>> {
    let mut rows = conn
        .query(&format!("{} WHERE b.batch_id = ?", BATCH_SELECT), params![batch_id])
        .await
        .map_err(|e| AppError::Database(format!("Failed to query batch: {}", e)))?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(batch_from_row(&row)?)),
        None => Ok(None),
    }
}

async fn degree_exists(conn: &Connection, degree_level_id: i64) -> Result<bool> {
    Ok(scalar(
        conn,
        "SELECT COUNT(*) FROM degree_levels WHERE degree_level_id = ?",
        degree_level_id,
    )
    .await?
        > 0)
}

fn check_durations(minimum: i64, maximum: Option<i64>) -> Result<()> {
    if minimum <= 0 {
        return Err(AppError::Validation(
            "Minimum duration must be a positive number of years".to_string(),
        ));
    }
    if maximum.is_some_and(|maximum| maximum < minimum) {
        return Err(AppError::Validation(
            "Maximum duration cannot be less than minimum duration".to_string(),
        ));
    }
    Ok(())
}

impl DbClient {
    // ============= Degree levels =============

    pub async fn list_degrees(&self) -> Result<Vec<DegreeLevel>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT degree_level_id, level_name FROM degree_levels ORDER BY level_name",
                (),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list degree levels: {}", e)))?;

        let mut degrees = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            degrees.push(DegreeLevel {
                degree_level_id: row.get(0).map_err(db_err)?,
                level_name: row.get(1).map_err(db_err)?,
            });
        }
        Ok(degrees)
    }

    pub async fn get_degree(&self, degree_level_id: i64) -> Result<Option<DegreeLevel>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT degree_level_id, level_name FROM degree_levels WHERE degree_level_id = ?",
                params![degree_level_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(DegreeLevel {
                degree_level_id: row.get(0).map_err(db_err)?,
                level_name: row.get(1).map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn create_degree(&self, level_name: &str) -> Result<DegreeLevel> {
        let conn = self.writer().await?;
        conn.execute(
            "INSERT INTO degree_levels (level_name) VALUES (?)",
            params![level_name],
        )
        .await
        .map_err(|e| conflict_on_unique(e, DEGREE_TAKEN))?;

        Ok(DegreeLevel {
            degree_level_id: conn.last_insert_rowid(),
            level_name: level_name.to_string(),
        })
    }

    pub async fn update_degree(&self, degree_level_id: i64, level_name: &str) -> Result<DegreeLevel> {
        let conn = self.writer().await?;
        let changed = conn
            .execute(
                "UPDATE degree_levels SET level_name = ? WHERE degree_level_id = ?",
                params![level_name, degree_level_id],
            )
            .await
            .map_err(|e| conflict_on_unique(e, DEGREE_TAKEN))?;

        if changed == 0 {
            return Err(AppError::NotFound("Degree level not found".to_string()));
        }
        Ok(DegreeLevel {
            degree_level_id,
            level_name: level_name.to_string(),
        })
    }

    pub async fn delete_degree(&self, degree_level_id: i64) -> Result<()> {
        let tx = self.begin().await?;
        let outcome = async {
            let programmes = scalar(
                &tx,
                "SELECT COUNT(*) FROM programmes WHERE degree_level_id = ?",
                degree_level_id,
            )
            .await?;
            if programmes > 0 {
                return Err(AppError::Conflict(
                    "Degree level is used by existing programmes".to_string(),
                ));
            }

            let deleted = tx
                .execute(
                    "DELETE FROM degree_levels WHERE degree_level_id = ?",
                    params![degree_level_id],
                )
                .await
                .map_err(db_err)?;
            if deleted == 0 {
                return Err(AppError::NotFound("Degree level not found".to_string()));
            }
            Ok(())
        }
        .await;
        self.finish(tx, outcome).await
    }

    // ============= Programmes =============

    pub async fn list_programmes(&self, department_id: i64) -> Result<Vec<Programme>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "{} WHERE p.department_id = ? ORDER BY p.programme_name",
                    PROGRAMME_SELECT
                ),
                params![department_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list programmes: {}", e)))?;

        let mut programmes = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            programmes.push(programme_from_row(&row)?);
        }
        Ok(programmes)
    }

    pub async fn get_programme(&self, programme_id: i64) -> Result<Option<Programme>> {
        let conn = self.connection().await?;
        programme_by_id(&conn, programme_id).await
    }

    pub async fn create_programme(&self, new: NewProgramme) -> Result<Programme> {
        check_durations(new.minimum_duration_years, new.maximum_duration_years)?;

        let tx = self.begin().await?;
        let outcome = async {
            if !degree_exists(&tx, new.degree_level_id).await? {
                return Err(AppError::Validation("Degree level does not exist".to_string()));
            }

            tx.execute(
                "INSERT INTO programmes
                    (programme_name, degree_level_id, minimum_duration_years,
                     maximum_duration_years, department_id, is_active)
                 VALUES (?, ?, ?, ?, ?, 1)",
                params![
                    new.programme_name.as_str(),
                    new.degree_level_id,
                    new.minimum_duration_years,
                    new.maximum_duration_years,
                    new.department_id
                ],
            )
            .await
            .map_err(|e| conflict_on_unique(e, PROGRAMME_TAKEN))?;

            programme_by_id(&tx, tx.last_insert_rowid())
                .await?
                .ok_or_else(|| AppError::Internal("Created programme vanished".to_string()))
        }
        .await;
        self.finish(tx, outcome).await
    }

    /// Updates a programme. Deactivating it deactivates the accounts of every
    /// student enrolled in one of its batches, in the same transaction.
    pub async fn update_programme(
        &self,
        programme_id: i64,
        changes: ProgrammeChanges,
    ) -> Result<Programme> {
        let tx = self.begin().await?;
        let outcome = async {
            let current = programme_by_id(&tx, programme_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Programme not found".to_string()))?;

            let minimum = changes
                .minimum_duration_years
                .unwrap_or(current.minimum_duration_years);
            let maximum = changes
                .maximum_duration_years
                .or(current.maximum_duration_years);
            check_durations(minimum, maximum)?;

            let degree_level_id = changes.degree_level_id.unwrap_or(current.degree_level_id);
            if !degree_exists(&tx, degree_level_id).await? {
                return Err(AppError::Validation("Degree level does not exist".to_string()));
            }

            let is_active = changes.is_active.unwrap_or(current.is_active);
            tx.execute(
                "UPDATE programmes
                 SET programme_name = ?, degree_level_id = ?, minimum_duration_years = ?,
                     maximum_duration_years = ?, is_active = ?
                 WHERE programme_id = ?",
                params![
                    changes
                        .programme_name
                        .as_deref()
                        .unwrap_or(&current.programme_name),
                    degree_level_id,
                    minimum,
                    maximum,
                    is_active as i64,
                    programme_id
                ],
            )
            .await
            .map_err(|e| conflict_on_unique(e, PROGRAMME_TAKEN))?;

            if current.is_active && !is_active {
                let affected = tx
                    .execute(
                        "UPDATE user_accounts SET is_active = 0
                         WHERE user_id IN (
                             SELECT sp.user_id FROM student_profiles sp
                             JOIN batches b ON sp.batch_id = b.batch_id
                             WHERE b.programme_id = ?
                         )",
                        params![programme_id],
                    )
                    .await
                    .map_err(db_err)?;
                tracing::info!(programme_id, affected, "programme deactivated, students deactivated");
            }

            programme_by_id(&tx, programme_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Programme not found".to_string()))
        }
        .await;
        self.finish(tx, outcome).await
    }

    pub async fn delete_programme(&self, programme_id: i64) -> Result<()> {
        let tx = self.begin().await?;
        let outcome = async {
            let batches = scalar(
                &tx,
                "SELECT COUNT(*) FROM batches WHERE programme_id = ?",
                programme_id,
            )
            .await?;
            if batches > 0 {
                return Err(AppError::Conflict(
                    "Programme still has batches".to_string(),
                ));
            }

            let deleted = tx
                .execute(
                    "DELETE FROM programmes WHERE programme_id = ?",
                    params![programme_id],
                )
                .await
                .map_err(db_err)?;
            if deleted == 0 {
                return Err(AppError::NotFound("Programme not found".to_string()));
            }
            Ok(())
        }
        .await;
        self.finish(tx, outcome).await
    }

    // ============= Batches =============

    pub async fn list_batches(&self, department_id: i64) -> Result<Vec<Batch>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "{} WHERE b.department_id = ? ORDER BY b.start_year DESC, b.batch_name",
                    BATCH_SELECT
                ),
                params![department_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list batches: {}", e)))?;

        let mut batches = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            batches.push(batch_from_row(&row)?);
        }
        Ok(batches)
    }

    pub async fn get_batch(&self, batch_id: i64) -> Result<Option<Batch>> {
        let conn = self.connection().await?;
        batch_by_id(&conn, batch_id).await
    }

    pub async fn create_batch(&self, new: NewBatch) -> Result<Batch> {
        let conn = self.writer().await?;
        conn.execute(
            "INSERT INTO batches
                (programme_id, department_id, batch_name, start_year, start_semester, is_active)
             VALUES (?, ?, ?, ?, ?, 1)",
            params![
                new.programme_id,
                new.department_id,
                new.batch_name.as_str(),
                new.start_year,
                new.start_semester.as_str()
            ],
        )
        .await
        .map_err(|e| conflict_on_unique(e, BATCH_TAKEN))?;

        batch_by_id(&conn, conn.last_insert_rowid())
            .await?
            .ok_or_else(|| AppError::Internal("Created batch vanished".to_string()))
    }

    /// Updates a batch. Deactivating it deactivates its students' accounts in
    /// the same transaction.
    pub async fn update_batch(&self, batch_id: i64, changes: BatchChanges) -> Result<Batch> {
        let tx = self.begin().await?;
        let outcome = async {
            let current = batch_by_id(&tx, batch_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))?;

            let is_active = changes.is_active.unwrap_or(current.is_active);
            tx.execute(
                "UPDATE batches
                 SET batch_name = ?, start_year = ?, start_semester = ?, is_active = ?
                 WHERE batch_id = ?",
                params![
                    changes.batch_name.as_deref().unwrap_or(&current.batch_name),
                    changes.start_year.unwrap_or(current.start_year),
                    changes
                        .start_semester
                        .unwrap_or(current.start_semester)
                        .as_str(),
                    is_active as i64,
                    batch_id
                ],
            )
            .await
            .map_err(|e| conflict_on_unique(e, BATCH_TAKEN))?;

            if current.is_active && !is_active {
                let affected = tx
                    .execute(
                        "UPDATE user_accounts SET is_active = 0
                         WHERE user_id IN (
                             SELECT user_id FROM student_profiles WHERE batch_id = ?
                         )",
                        params![batch_id],
                    )
                    .await
                    .map_err(db_err)?;
                tracing::info!(batch_id, affected, "batch deactivated, students deactivated");
            }

            batch_by_id(&tx, batch_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))
        }
        .await;
        self.finish(tx, outcome).await
    }

    pub async fn delete_batch(&self, batch_id: i64) -> Result<()> {
        let tx = self.begin().await?;
        let outcome = async {
            let students = scalar(
                &tx,
                "SELECT COUNT(*) FROM student_profiles WHERE batch_id = ?",
                batch_id,
            )
            .await?;
            if students > 0 {
                return Err(AppError::Conflict("Batch still has students".to_string()));
            }

            let deleted = tx
                .execute("DELETE FROM batches WHERE batch_id = ?", params![batch_id])
                .await
                .map_err(db_err)?;
            if deleted == 0 {
                return Err(AppError::NotFound("Batch not found".to_string()));
            }
            Ok(())
        }
        .await;
        self.finish(tx, outcome).await
    }
}
