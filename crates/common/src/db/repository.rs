//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, Set, SqlErr, Statement,
};
use serde::{Deserialize, Serialize};

/// The three name-keyed lookup tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Department,
    SubjectType,
    ProgramType,
}

impl LookupKind {
    fn table(&self) -> &'static str {
        match self {
            LookupKind::Department => "departments",
            LookupKind::SubjectType => "subject_types",
            LookupKind::ProgramType => "program_types",
        }
    }

    /// Human-readable name used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            LookupKind::Department => "department",
            LookupKind::SubjectType => "subject type",
            LookupKind::ProgramType => "program type",
        }
    }
}

/// A row of any lookup table
#[derive(Debug, Clone, Serialize, Deserialize, FromQueryResult)]
pub struct Lookup {
    pub id: i32,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

/// Fields of a question paper about to be inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPaper {
    pub subject_name: String,
    pub subject_code: String,
    pub paper_code: Option<String>,
    pub year_of_examination: i32,
    pub semester: i32,
    pub subject_type_id: Option<i32>,
    pub program_type_id: Option<i32>,
    pub department_id: Option<i32>,
    pub description: Option<String>,
    pub file_url: String,
    pub file_type: String,
    pub original_filename: Option<String>,
    pub created_by: Option<i32>,
}

/// Search filters for the paper listing. Text filters match case-insensitively
/// anywhere in the column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaperFilter {
    pub subject: Option<String>,
    pub subject_code: Option<String>,
    pub year: Option<i32>,
    pub semester: Option<i32>,
    pub department_id: Option<i32>,
    pub subject_type_id: Option<i32>,
    pub program_type_id: Option<i32>,
    pub limit: Option<u64>,
}

/// A question paper joined with the names of its lookups
#[derive(Debug, Clone, Serialize, Deserialize, FromQueryResult)]
pub struct PaperListing {
    pub id: i32,
    pub subject_name: String,
    pub subject_code: String,
    pub paper_code: Option<String>,
    pub year_of_examination: i32,
    pub semester: i32,
    pub subject_type_id: Option<i32>,
    pub program_type_id: Option<i32>,
    pub department_id: Option<i32>,
    pub description: Option<String>,
    pub file_url: String,
    pub file_type: String,
    pub original_filename: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
    pub department_name: Option<String>,
    pub subject_type_name: Option<String>,
    pub program_type_name: Option<String>,
}

const LISTING_SELECT: &str = r#"
    SELECT qp.id, qp.subject_name, qp.subject_code, qp.paper_code,
           qp.year_of_examination, qp.semester, qp.subject_type_id,
           qp.program_type_id, qp.department_id, qp.description, qp.file_url,
           qp.file_type, qp.original_filename, qp.created_by, qp.created_at,
           d.name AS department_name,
           st.name AS subject_type_name,
           pt.name AS program_type_name
    FROM question_papers qp
    LEFT JOIN departments d ON qp.department_id = d.id
    LEFT JOIN subject_types st ON qp.subject_type_id = st.id
    LEFT JOIN program_types pt ON qp.program_type_id = pt.id
"#;

/// Map unique-constraint violations to `AppError::Duplicate`
fn map_insert_error(err: DbErr, message: impl FnOnce() -> String) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Duplicate { message: message() },
        _ => AppError::Database(err),
    }
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Number of registered accounts
    pub async fn count_users(&self) -> Result<u64> {
        UserEntity::find()
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by email
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by ID
    pub async fn find_user_by_id(&self, id: i32) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Create an admin account
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: String,
        name: Option<String>,
    ) -> Result<User> {
        let user = UserActiveModel {
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            name: Set(name),
            role: Set(ROLE_ADMIN.to_string()),
            ..Default::default()
        };

        user.insert(self.write_conn())
            .await
            .map_err(|e| map_insert_error(e, || format!("account {} already exists", email)))
    }

    // ========================================================================
    // Lookup Operations
    // ========================================================================

    /// All rows of a lookup table, ordered by name
    pub async fn list_lookups(&self, kind: LookupKind) -> Result<Vec<Lookup>> {
        let sql = format!(
            "SELECT id, name, created_at FROM {} ORDER BY name ASC",
            kind.table()
        );

        Lookup::find_by_statement(Statement::from_string(DbBackend::Postgres, sql))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a lookup row by ID
    pub async fn find_lookup_by_id(&self, kind: LookupKind, id: i32) -> Result<Option<Lookup>> {
        let sql = format!("SELECT id, name, created_at FROM {} WHERE id = $1", kind.table());

        Lookup::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![id.into()],
        ))
        .one(self.read_conn())
        .await
        .map_err(Into::into)
    }

    /// Find a lookup row by name, ignoring case
    pub async fn find_lookup_by_name(&self, kind: LookupKind, name: &str) -> Result<Option<Lookup>> {
        let sql = format!(
            "SELECT id, name, created_at FROM {} WHERE LOWER(name) = LOWER($1) ORDER BY id LIMIT 1",
            kind.table()
        );

        Lookup::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![name.into()],
        ))
        .one(self.read_conn())
        .await
        .map_err(Into::into)
    }

    /// First lookup row whose name contains `fragment`, ignoring case
    pub async fn find_lookup_containing(
        &self,
        kind: LookupKind,
        fragment: &str,
    ) -> Result<Option<Lookup>> {
        let sql = format!(
            "SELECT id, name, created_at FROM {} WHERE name ILIKE $1 ORDER BY id LIMIT 1",
            kind.table()
        );
        let pattern = format!("%{}%", fragment);

        Lookup::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![pattern.into()],
        ))
        .one(self.read_conn())
        .await
        .map_err(Into::into)
    }

    /// Fetch a lookup row by name, creating it when absent.
    ///
    /// Returns the row and whether it was created by this call.
    pub async fn get_or_create_lookup(&self, kind: LookupKind, name: &str) -> Result<(Lookup, bool)> {
        if let Some(existing) = self.find_lookup_by_name(kind, name).await? {
            return Ok((existing, false));
        }

        let sql = format!(
            "INSERT INTO {} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id, name, created_at",
            kind.table()
        );

        let inserted = Lookup::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![name.into()],
        ))
        .one(self.write_conn())
        .await?;

        match inserted {
            Some(row) => {
                tracing::info!(kind = kind.label(), name = %row.name, id = row.id, "Lookup created");
                Ok((row, true))
            }
            // Lost a race with a concurrent insert of the same name
            None => self
                .find_lookup_by_name(kind, name)
                .await?
                .map(|row| (row, false))
                .ok_or_else(|| AppError::Internal {
                    message: format!("{} '{}' vanished after insert", kind.label(), name),
                }),
        }
    }

    // ========================================================================
    // Question Paper Operations
    // ========================================================================

    /// Whether a paper with this paper code already exists for the year
    pub async fn paper_exists(&self, paper_code: &str, year: i32) -> Result<bool> {
        let count = QuestionPaperEntity::find()
            .filter(QuestionPaperColumn::PaperCode.eq(paper_code))
            .filter(QuestionPaperColumn::YearOfExamination.eq(year))
            .count(self.write_conn())
            .await?;

        Ok(count > 0)
    }

    /// Insert a question paper
    pub async fn create_paper(&self, paper: NewPaper) -> Result<QuestionPaper> {
        let code = paper.paper_code.clone().unwrap_or_default();
        let year = paper.year_of_examination;

        let model = QuestionPaperActiveModel {
            subject_name: Set(paper.subject_name),
            subject_code: Set(paper.subject_code),
            paper_code: Set(paper.paper_code),
            year_of_examination: Set(paper.year_of_examination),
            semester: Set(paper.semester),
            subject_type_id: Set(paper.subject_type_id),
            program_type_id: Set(paper.program_type_id),
            department_id: Set(paper.department_id),
            description: Set(paper.description),
            file_url: Set(paper.file_url),
            file_type: Set(paper.file_type),
            original_filename: Set(paper.original_filename),
            created_by: Set(paper.created_by),
            ..Default::default()
        };

        model
            .insert(self.write_conn())
            .await
            .map_err(|e| map_insert_error(e, || format!("paper {} for {} already exists", code, year)))
    }

    /// Find paper by ID
    pub async fn find_paper_by_id(&self, id: i32) -> Result<Option<QuestionPaper>> {
        QuestionPaperEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find paper by ID, joined with lookup names
    pub async fn find_listing_by_id(&self, id: i32) -> Result<Option<PaperListing>> {
        let sql = format!("{} WHERE qp.id = $1", LISTING_SELECT);

        PaperListing::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![id.into()],
        ))
        .one(self.read_conn())
        .await
        .map_err(Into::into)
    }

    /// Search papers, newest first
    pub async fn list_papers(&self, filter: &PaperFilter) -> Result<Vec<PaperListing>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<sea_orm::Value> = Vec::new();

        if let Some(subject) = filter.subject.as_deref().filter(|s| !s.is_empty()) {
            values.push(format!("%{}%", subject).into());
            conditions.push(format!("qp.subject_name ILIKE ${}", values.len()));
        }

        if let Some(code) = filter.subject_code.as_deref().filter(|s| !s.is_empty()) {
            values.push(format!("%{}%", code).into());
            conditions.push(format!("qp.subject_code ILIKE ${}", values.len()));
        }

        let exact = [
            ("qp.year_of_examination", filter.year),
            ("qp.semester", filter.semester),
            ("qp.department_id", filter.department_id),
            ("qp.subject_type_id", filter.subject_type_id),
            ("qp.program_type_id", filter.program_type_id),
        ];
        for (column, value) in exact {
            if let Some(v) = value {
                values.push(v.into());
                conditions.push(format!("{} = ${}", column, values.len()));
            }
        }

        let mut sql = LISTING_SELECT.to_string();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY qp.created_at DESC");

        if let Some(limit) = filter.limit {
            values.push((limit as i64).into());
            sql.push_str(&format!(" LIMIT ${}", values.len()));
        }

        PaperListing::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            values,
        ))
        .all(self.read_conn())
        .await
        .map_err(Into::into)
    }

    /// Delete paper by ID
    pub async fn delete_paper(&self, id: i32) -> Result<bool> {
        let result = QuestionPaperEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}
