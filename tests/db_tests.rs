//! Database integration tests
//!
//! These tests exercise DbClient directly against in-memory and file-backed
//! libsql databases.

use registrar::{
    db::{HodAssignment, NewBatch, NewProgramme},
    types::{
        AccountChanges, AppError, BatchChanges, NewAccount, PersonalDetails, ProgrammeChanges, Role,
        Semester,
    },
    DbClient,
};

async fn create_test_client() -> DbClient {
    DbClient::new_memory()
        .await
        .expect("Failed to create in-memory database")
}

fn new_account(email: &str, role: Role, department_id: Option<i64>) -> NewAccount {
    NewAccount {
        full_name: format!("{} account", role),
        email: email.to_string(),
        password_hash: "$argon2id$placeholder".to_string(),
        role,
        department_id,
        batch_id: None,
        roll_number: None,
    }
}

/// A department with its HOD, a degree level and one programme.
async fn seed(client: &DbClient) -> (i64, i64) {
    let department = client
        .create_department(
            "CSE",
            "Computer Science",
            HodAssignment {
                email: "hod@uni.edu".to_string(),
                name: Some("Head".to_string()),
            },
        )
        .await
        .expect("department");
    let degree = client.create_degree("Undergraduate").await.expect("degree");
    let programme = client
        .create_programme(NewProgramme {
            programme_name: "BSc CS".to_string(),
            degree_level_id: degree.degree_level_id,
            minimum_duration_years: 3,
            maximum_duration_years: Some(5),
            department_id: department.department_id,
        })
        .await
        .expect("programme");

    (department.department_id, programme.programme_id)
}

async fn seed_student(client: &DbClient, department_id: i64, programme_id: i64) -> (i64, i64) {
    let batch = client
        .create_batch(NewBatch {
            programme_id,
            department_id,
            batch_name: "2024".to_string(),
            start_year: 2024,
            start_semester: Semester::Autumn,
        })
        .await
        .expect("batch");
    let student = client
        .create_account(NewAccount {
            batch_id: Some(batch.batch_id),
            ..new_account("stu@uni.edu", Role::Student, Some(department_id))
        })
        .await
        .expect("student");

    (batch.batch_id, student.user_id)
}

#[tokio::test]
async fn test_create_local_client() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("registrar.db");

    let client = DbClient::new(&format!("file:{}", path.display()))
        .await
        .expect("Failed to create local database");
    client
        .create_account(new_account("admin@uni.edu", Role::Admin, None))
        .await
        .unwrap();
    drop(client);

    let reopened = DbClient::new_local(&path).await.unwrap();
    assert!(reopened
        .get_account_by_email("admin@uni.edu")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let client = create_test_client().await;
    client
        .create_account(new_account("dup@uni.edu", Role::Admin, None))
        .await
        .unwrap();

    let result = client
        .create_account(new_account("dup@uni.edu", Role::Admin, None))
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_department_role_requires_department() {
    let client = create_test_client().await;

    let result = client
        .create_account(new_account("fac@uni.edu", Role::Faculty, None))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(client
        .get_account_by_email("fac@uni.edu")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_profiles_follow_role() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;

    let account = client
        .create_account(new_account("fac@uni.edu", Role::Faculty, Some(department_id)))
        .await
        .unwrap();
    assert!(client.has_faculty_profile(account.user_id).await.unwrap());
    assert!(!client.has_student_profile(account.user_id).await.unwrap());

    client
        .update_account(
            account.user_id,
            AccountChanges {
                role: Some(Role::Student),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!client.has_faculty_profile(account.user_id).await.unwrap());
    assert!(client.has_student_profile(account.user_id).await.unwrap());

    client
        .update_account(
            account.user_id,
            AccountChanges {
                role: Some(Role::Staff),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!client.has_faculty_profile(account.user_id).await.unwrap());
    assert!(!client.has_student_profile(account.user_id).await.unwrap());
}

#[tokio::test]
async fn test_bulk_insert_is_atomic() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;

    let result = client
        .create_accounts(vec![
            new_account("a@uni.edu", Role::Student, Some(department_id)),
            new_account("a@uni.edu", Role::Student, Some(department_id)),
        ])
        .await;

    assert!(result.is_err());
    assert!(client.get_account_by_email("a@uni.edu").await.unwrap().is_none());
}

#[tokio::test]
async fn test_programme_deactivation_cascades() {
    let client = create_test_client().await;
    let (department_id, programme_id) = seed(&client).await;
    let (_, student_id) = seed_student(&client, department_id, programme_id).await;

    let programme = client
        .update_programme(
            programme_id,
            ProgrammeChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!programme.is_active);
    assert!(!client.get_account(student_id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_programme_deactivation_rolls_back_on_failure() {
    let client = create_test_client().await;
    let (department_id, programme_id) = seed(&client).await;
    let (_, student_id) = seed_student(&client, department_id, programme_id).await;

    let conn = client.connection().await.unwrap();
    conn.execute(
        "CREATE TRIGGER block_deactivation BEFORE UPDATE OF is_active ON user_accounts
         BEGIN SELECT RAISE(ABORT, 'injected'); END;",
        (),
    )
    .await
    .unwrap();

    let result = client
        .update_programme(
            programme_id,
            ProgrammeChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await;

    assert!(result.is_err());
    assert!(client.get_programme(programme_id).await.unwrap().unwrap().is_active);
    assert!(client.get_account(student_id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_batch_deactivation_cascades() {
    let client = create_test_client().await;
    let (department_id, programme_id) = seed(&client).await;
    let (batch_id, student_id) = seed_student(&client, department_id, programme_id).await;

    client
        .update_batch(
            batch_id,
            BatchChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!client.get_account(student_id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_batch_with_students_cannot_be_deleted() {
    let client = create_test_client().await;
    let (department_id, programme_id) = seed(&client).await;
    let (batch_id, student_id) = seed_student(&client, department_id, programme_id).await;

    assert!(matches!(
        client.delete_batch(batch_id).await,
        Err(AppError::Conflict(_))
    ));

    client.delete_account(student_id).await.unwrap();
    client.delete_batch(batch_id).await.unwrap();
    assert!(client.get_batch(batch_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_deleting_account_removes_profile() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;
    let account = client
        .create_account(new_account("fac@uni.edu", Role::Faculty, Some(department_id)))
        .await
        .unwrap();

    client.delete_account(account.user_id).await.unwrap();

    assert!(!client.has_faculty_profile(account.user_id).await.unwrap());
}

#[tokio::test]
async fn test_admin_cannot_become_hod() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;
    client
        .create_account(new_account("root@uni.edu", Role::Admin, None))
        .await
        .unwrap();

    let result = client
        .update_department(
            department_id,
            registrar::db::DepartmentChanges {
                hod: Some(HodAssignment {
                    email: "root@uni.edu".to_string(),
                    name: None,
                }),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    let department = client.get_department(department_id).await.unwrap().unwrap();
    assert_eq!(department.hod_email.as_deref(), Some("hod@uni.edu"));
}

#[tokio::test]
async fn test_activate_department_accounts_is_scoped() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;
    let other = client
        .create_department(
            "ECE",
            "Electronics",
            HodAssignment {
                email: "ece@uni.edu".to_string(),
                name: Some("Ece".to_string()),
            },
        )
        .await
        .unwrap();

    let mine = client
        .create_account(new_account("mine@uni.edu", Role::Staff, Some(department_id)))
        .await
        .unwrap();
    let theirs = client
        .create_account(new_account("theirs@uni.edu", Role::Staff, Some(other.department_id)))
        .await
        .unwrap();
    client.set_account_active(mine.user_id, false).await.unwrap();
    client.set_account_active(theirs.user_id, false).await.unwrap();

    let activated = client
        .activate_department_accounts(department_id, &[mine.user_id, theirs.user_id])
        .await
        .unwrap();

    assert_eq!(activated, 1);
    assert!(client.get_account(mine.user_id).await.unwrap().unwrap().is_active);
    assert!(!client.get_account(theirs.user_id).await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn test_revoked_tokens_expire() {
    let client = create_test_client().await;

    client.revoke_token("old", 100, 50).await.unwrap();
    client.revoke_token("new", 1_000, 50).await.unwrap();
    assert!(client.is_token_revoked("old").await.unwrap());

    // Revoking at a later time purges entries that have expired.
    client.revoke_token("newer", 2_000, 500).await.unwrap();
    assert!(!client.is_token_revoked("old").await.unwrap());
    assert!(client.is_token_revoked("new").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_inserts_return_their_own_ids() {
    let client = std::sync::Arc::new(create_test_client().await);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.create_degree(&format!("Level {}", i)).await })
        })
        .collect();

    for task in tasks {
        let degree = task.await.unwrap().unwrap();
        let stored = client
            .get_degree(degree.degree_level_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.level_name, degree.level_name);
    }
}

#[tokio::test]
async fn test_standalone_write_waits_for_open_transaction() {
    let client = std::sync::Arc::new(create_test_client().await);

    let tx = client.begin().await.unwrap();
    tx.execute(
        "INSERT INTO degree_levels (level_name) VALUES ('Discarded')",
        (),
    )
    .await
    .unwrap();

    let writer = {
        let client = client.clone();
        tokio::spawn(async move { client.create_degree("Kept").await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!writer.is_finished());

    let outcome: registrar::Result<()> = Err(AppError::Validation("abort".to_string()));
    assert!(client.finish(tx, outcome).await.is_err());

    let kept = writer.await.unwrap().unwrap();
    let degrees = client.list_degrees().await.unwrap();
    assert_eq!(degrees.len(), 1);
    assert_eq!(degrees[0].degree_level_id, kept.degree_level_id);
    assert_eq!(degrees[0].level_name, "Kept");
}

async fn seed_student_with_roll(client: &DbClient, email: &str, department_id: i64, roll: &str) -> i64 {
    client
        .create_account(NewAccount {
            roll_number: Some(roll.to_string()),
            ..new_account(email, Role::Student, Some(department_id))
        })
        .await
        .expect("student")
        .user_id
}

#[tokio::test]
async fn test_assign_students_reports_each_roll() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;
    let faculty = client
        .create_account(new_account("fac@uni.edu", Role::Faculty, Some(department_id)))
        .await
        .unwrap();
    seed_student_with_roll(&client, "one@uni.edu", department_id, "R1").await;
    let mentor = client.create_association_type("Mentor").await.unwrap();
    let rolls = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();

    let missing_type = client
        .assign_students(faculty.user_id, 999, &rolls(&["R1"]), None)
        .await;
    assert!(matches!(missing_type, Err(AppError::NotFound(_))));

    let outcome = client
        .assign_students(
            faculty.user_id,
            mentor.association_type_id,
            &rolls(&["R1", "R404", "R1"]),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.assigned, 1);
    assert_eq!(outcome.already_assigned, vec!["R1".to_string()]);
    assert_eq!(outcome.not_found, vec!["R404".to_string()]);

    let associations = client.list_associations(None, None).await.unwrap();
    assert_eq!(associations.len(), 1);
    assert_eq!(associations[0].association_type, "Mentor");
    assert_eq!(associations[0].roll_number.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_staff_cannot_be_assigned_students() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;
    let staff = client
        .create_account(new_account("staff@uni.edu", Role::Staff, Some(department_id)))
        .await
        .unwrap();
    seed_student_with_roll(&client, "one@uni.edu", department_id, "R1").await;
    let mentor = client.create_association_type("Mentor").await.unwrap();

    let result = client
        .assign_students(
            staff.user_id,
            mentor.association_type_id,
            &["R1".to_string()],
            Some(department_id),
        )
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(client.list_associations(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_roll_numbers_are_unique() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;
    seed_student_with_roll(&client, "one@uni.edu", department_id, "R1").await;

    let result = client
        .create_account(NewAccount {
            roll_number: Some("R1".to_string()),
            ..new_account("two@uni.edu", Role::Student, Some(department_id))
        })
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(client.get_account_by_email("two@uni.edu").await.unwrap().is_none());
}

#[tokio::test]
async fn test_student_details_survive_batch_move() {
    let client = create_test_client().await;
    let (department_id, programme_id) = seed(&client).await;
    let (_, student_id) = seed_student(&client, department_id, programme_id).await;
    let next_batch = client
        .create_batch(NewBatch {
            programme_id,
            department_id,
            batch_name: "2025".to_string(),
            start_year: 2025,
            start_semester: Semester::Autumn,
        })
        .await
        .unwrap();

    let details = PersonalDetails {
        date_of_birth: "2004-05-17".to_string(),
        phone_number_self: "9876543210".to_string(),
        ..Default::default()
    };
    client
        .update_student_personal(student_id, &details, "stu@uni.edu", None)
        .await
        .unwrap();

    client
        .update_account(
            student_id,
            AccountChanges {
                batch_id: Some(next_batch.batch_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let profile = client.get_student_profile(student_id).await.unwrap().unwrap();
    assert_eq!(profile.batch_id, Some(next_batch.batch_id));
    assert_eq!(profile.date_of_birth.as_deref(), Some("2004-05-17"));
    assert_eq!(profile.phone_number_self.as_deref(), Some("9876543210"));
}

#[tokio::test]
async fn test_student_update_is_all_or_nothing() {
    let client = create_test_client().await;
    let (department_id, programme_id) = seed(&client).await;
    let (_, student_id) = seed_student(&client, department_id, programme_id).await;

    let details = PersonalDetails {
        current_address: "Hostel 4".to_string(),
        ..Default::default()
    };
    let result = client
        .update_student_personal(student_id, &details, "hod@uni.edu", None)
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let profile = client.get_student_profile(student_id).await.unwrap().unwrap();
    assert_eq!(profile.current_address, None);
    let account = client.get_account(student_id).await.unwrap().unwrap();
    assert_eq!(account.email, "stu@uni.edu");
}

#[tokio::test]
async fn test_role_change_drops_associations() {
    let client = create_test_client().await;
    let (department_id, _) = seed(&client).await;
    let faculty = client
        .create_account(new_account("fac@uni.edu", Role::Faculty, Some(department_id)))
        .await
        .unwrap();
    let student_id = seed_student_with_roll(&client, "one@uni.edu", department_id, "R1").await;
    let mentor = client.create_association_type("Mentor").await.unwrap();
    client
        .assign_students(
            faculty.user_id,
            mentor.association_type_id,
            &["R1".to_string()],
            None,
        )
        .await
        .unwrap();

    client
        .update_account(
            student_id,
            AccountChanges {
                role: Some(Role::Staff),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(client.list_associations(None, None).await.unwrap().is_empty());
    client
        .delete_association_type(mentor.association_type_id)
        .await
        .unwrap();
}
