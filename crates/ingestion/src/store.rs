//! Persistence seam for the import pipeline
//!
//! The importer only needs lookups, a duplicate check and an insert; the
//! database `Repository` provides them in production and `MemoryStore` in
//! tests and dry runs.

use async_trait::async_trait;
use papervault_common::db::{LookupKind, NewPaper, Repository};
use papervault_common::errors::{AppError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Department with this name, created if absent
    async fn department_by_name(&self, name: &str) -> Result<i32>;

    /// First existing department whose name contains `fragment`, ignoring case
    async fn department_matching(&self, fragment: &str) -> Result<Option<i32>>;

    /// Subject type with this name, created if absent
    async fn subject_type_by_name(&self, name: &str) -> Result<i32>;

    async fn paper_exists(&self, paper_code: &str, year: i32) -> Result<bool>;

    /// Insert a paper, returning its id. A paper with the same code and
    /// year fails with `AppError::Duplicate`.
    async fn insert_paper(&self, paper: NewPaper) -> Result<i32>;
}

#[async_trait]
impl PaperStore for Repository {
    async fn department_by_name(&self, name: &str) -> Result<i32> {
        let (row, _) = self.get_or_create_lookup(LookupKind::Department, name).await?;
        Ok(row.id)
    }

    async fn department_matching(&self, fragment: &str) -> Result<Option<i32>> {
        let row = self
            .find_lookup_containing(LookupKind::Department, fragment)
            .await?;
        Ok(row.map(|r| r.id))
    }

    async fn subject_type_by_name(&self, name: &str) -> Result<i32> {
        let (row, _) = self.get_or_create_lookup(LookupKind::SubjectType, name).await?;
        Ok(row.id)
    }

    async fn paper_exists(&self, paper_code: &str, year: i32) -> Result<bool> {
        Repository::paper_exists(self, paper_code, year).await
    }

    async fn insert_paper(&self, paper: NewPaper) -> Result<i32> {
        let created = self.create_paper(paper).await?;
        Ok(created.id)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    departments: Vec<(i32, String)>,
    subject_types: Vec<(i32, String)>,
    papers: Vec<(i32, NewPaper)>,
    next_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

type Table = fn(&mut MemoryState) -> &mut Vec<(i32, String)>;

fn get_or_insert(state: &mut MemoryState, table: Table, name: &str) -> i32 {
    let existing = table(state)
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(id, _)| *id);

    if let Some(id) = existing {
        return id;
    }

    let id = state.next_id();
    table(state).push((id, name.to_string()));
    id
}

/// In-memory `PaperStore` with the same uniqueness rules as the database
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with department names
    pub fn with_departments<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut state = MemoryState::default();
        for name in names {
            let id = state.next_id();
            state.departments.push((id, name.into()));
        }

        Self {
            state: Mutex::new(state),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of store operations performed so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn papers(&self) -> Vec<NewPaper> {
        self.state
            .lock()
            .await
            .papers
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub async fn department_names(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .departments
            .iter()
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub async fn subject_type_names(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .subject_types
            .iter()
            .map(|(_, n)| n.clone())
            .collect()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    async fn department_by_name(&self, name: &str) -> Result<i32> {
        self.touch();
        let mut state = self.state.lock().await;
        Ok(get_or_insert(&mut state, |s| &mut s.departments, name))
    }

    async fn department_matching(&self, fragment: &str) -> Result<Option<i32>> {
        self.touch();
        let needle = fragment.to_lowercase();
        let state = self.state.lock().await;
        Ok(state
            .departments
            .iter()
            .find(|(_, n)| n.to_lowercase().contains(&needle))
            .map(|(id, _)| *id))
    }

    async fn subject_type_by_name(&self, name: &str) -> Result<i32> {
        self.touch();
        let mut state = self.state.lock().await;
        Ok(get_or_insert(&mut state, |s| &mut s.subject_types, name))
    }

    async fn paper_exists(&self, paper_code: &str, year: i32) -> Result<bool> {
        self.touch();
        let state = self.state.lock().await;
        Ok(state.papers.iter().any(|(_, p)| {
            p.paper_code.as_deref() == Some(paper_code) && p.year_of_examination == year
        }))
    }

    async fn insert_paper(&self, paper: NewPaper) -> Result<i32> {
        self.touch();
        let mut state = self.state.lock().await;

        let clash = paper.paper_code.is_some()
            && state.papers.iter().any(|(_, p)| {
                p.paper_code == paper.paper_code && p.year_of_examination == paper.year_of_examination
            });
        if clash {
            return Err(AppError::Duplicate {
                message: format!(
                    "paper {} for {} already exists",
                    paper.paper_code.unwrap_or_default(),
                    paper.year_of_examination
                ),
            });
        }

        let id = state.next_id();
        state.papers.push((id, paper));
        Ok(id)
    }
}
