use crate::models::{
    Author, AuthorList, AuthorName, BirthDate, Book, CreateAuthorError, CreateAuthorRequest,
    CreateBookError, CreateBookRequest, ListAuthorBooksError, ListAuthorBooksRequest,
    PublicationStatus, UpdateAuthorError, UpdateAuthorRequest, UpdateBookError, UpdateBookRequest,
};
use crate::repositories::{AuthorRepository, BookRepository};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};
use std::str::FromStr;

static MIGRATOR: Migrator = sqlx::migrate!();

pub async fn establish_pool(path: &str) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(path)
        .with_context(|| format!("Invalid database path {path}"))?
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePool::connect_with(opts)
        .await
        .with_context(|| format!("Failed to open database at {path}"))?;

    MIGRATOR.run(&pool).await?;

    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct DefaultAuthorRepository {
    pool: SqlitePool,
}

impl DefaultAuthorRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone)]
pub struct DefaultBookRepository {
    pool: SqlitePool,
}

impl DefaultBookRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl<'r> FromRow<'r, SqliteRow> for Author {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let birth_date: NaiveDate = row.try_get("birth_date")?;

        Ok(Self::new(
            id,
            AuthorName::new_unchecked(&name),
            BirthDate::new_unchecked(birth_date),
        ))
    }
}

/// Scalar columns of a book row; the author list lives on `book_authors`.
#[derive(Debug)]
struct BookRow {
    id: i64,
    title: String,
    price: Option<Decimal>,
    status: PublicationStatus,
}

impl<'r> FromRow<'r, SqliteRow> for BookRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id = row.try_get("id")?;
        let title = row.try_get("title")?;
        let price = decode_price(row)?;
        let status = decode_status(row)?;

        Ok(Self {
            id,
            title,
            price,
            status,
        })
    }
}

struct BookAuthorRow {
    book: BookRow,
    author_id: i64,
}

impl<'r> FromRow<'r, SqliteRow> for BookAuthorRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            book: BookRow::from_row(row)?,
            author_id: row.try_get("author_id")?,
        })
    }
}

fn decode_price(row: &SqliteRow) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get("price")?;
    raw.map(|s| Decimal::from_str(&s))
        .transpose()
        .map_err(|err| sqlx::Error::ColumnDecode {
            index: "price".into(),
            source: Box::new(err),
        })
}

fn decode_status(row: &SqliteRow) -> Result<PublicationStatus, sqlx::Error> {
    let raw: Option<String> = row.try_get("status")?;
    PublicationStatus::from_column(raw.as_deref()).map_err(|err| sqlx::Error::ColumnDecode {
        index: "status".into(),
        source: Box::new(err),
    })
}

/// Collapses join rows, already ordered by (book id, author order), into
/// books carrying their complete ordered author lists.
fn group_book_rows(rows: Vec<BookAuthorRow>) -> Vec<Book> {
    let mut grouped: Vec<(BookRow, Vec<i64>)> = Vec::new();
    for row in rows {
        match grouped.last_mut() {
            Some((book, authors)) if book.id == row.book.id => authors.push(row.author_id),
            _ => grouped.push((row.book, vec![row.author_id])),
        }
    }

    grouped
        .into_iter()
        .map(|(book, authors)| {
            Book::new(
                book.id,
                book.title,
                book.price,
                book.status,
                AuthorList::new_unchecked(authors),
            )
        })
        .collect()
}

/// Full-set existence check; reports only whether one or more ids are
/// missing, so it can run before any write.
async fn all_authors_exist(conn: &mut SqliteConnection, ids: &[i64]) -> Result<bool, sqlx::Error> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT COUNT(*) FROM authors WHERE id IN ({placeholders})");

    let mut query = sqlx::query_scalar(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let count: i64 = query.fetch_one(&mut *conn).await?;

    Ok(count == ids.len() as i64)
}

async fn insert_book_authors(
    conn: &mut SqliteConnection,
    book_id: i64,
    authors: &AuthorList,
) -> Result<(), sqlx::Error> {
    for (author_id, order) in authors.ranked() {
        sqlx::query("INSERT INTO book_authors (book_id, author_id, author_order) VALUES (?, ?, ?)")
            .bind(book_id)
            .bind(author_id)
            .bind(order)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

async fn replace_book_authors(
    conn: &mut SqliteConnection,
    book_id: i64,
    authors: &AuthorList,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM book_authors WHERE book_id = ?")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;

    insert_book_authors(conn, book_id, authors).await
}

async fn stored_author_order(
    conn: &mut SqliteConnection,
    book_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT author_id FROM book_authors WHERE book_id = ? ORDER BY author_order")
        .bind(book_id)
        .fetch_all(&mut *conn)
        .await
}

#[async_trait]
impl AuthorRepository for DefaultAuthorRepository {
    async fn create_author(&self, req: &CreateAuthorRequest) -> Result<Author, CreateAuthorError> {
        let author = sqlx::query_as(
            "INSERT INTO authors (name, birth_date) VALUES (?, ?) RETURNING id, name, birth_date",
        )
        .bind(req.name().to_string())
        .bind(req.birth_date().date())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                CreateAuthorError::Duplicate {
                    name: req.name().to_string(),
                }
            } else {
                let err = anyhow!(err).context(format!(
                    r#"Failed to create author with name "{}""#,
                    req.name()
                ));
                CreateAuthorError::Other(err)
            }
        })?;

        Ok(author)
    }

    async fn update_author(&self, req: &UpdateAuthorRequest) -> Result<Author, UpdateAuthorError> {
        let mut tx = self.pool.begin().await.map_err(|err| {
            UpdateAuthorError::Other(anyhow!(err).context("Failed to begin transaction"))
        })?;

        let current: Author = sqlx::query_as("SELECT id, name, birth_date FROM authors WHERE id = ?")
            .bind(req.id())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|err| {
                let err = anyhow!(err).context(format!(
                    r#"Failed to retrieve author with id "{}""#,
                    req.id()
                ));
                UpdateAuthorError::Other(err)
            })?
            .ok_or(UpdateAuthorError::NotFound { id: req.id() })?;

        let merged = req.patch().merge(&current);

        let updated: Option<Author> = sqlx::query_as(
            "UPDATE authors SET name = ?, birth_date = ? WHERE id = ? RETURNING id, name, birth_date",
        )
        .bind(merged.name().to_string())
        .bind(merged.birth_date().date())
        .bind(merged.id())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                UpdateAuthorError::Duplicate {
                    name: merged.name().to_string(),
                }
            } else {
                let err = anyhow!(err)
                    .context(format!(r#"Failed to update author with id "{}""#, req.id()));
                UpdateAuthorError::Other(err)
            }
        })?;
        let updated = updated.ok_or(UpdateAuthorError::LostUpdate { id: req.id() })?;

        tx.commit().await.map_err(|err| {
            UpdateAuthorError::Other(anyhow!(err).context("Failed to commit transaction"))
        })?;

        Ok(updated)
    }

    async fn list_books_by_author(
        &self,
        req: &ListAuthorBooksRequest,
    ) -> Result<Vec<Book>, ListAuthorBooksError> {
        let author_id: Option<i64> = sqlx::query_scalar("SELECT id FROM authors WHERE id = ?")
            .bind(req.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                let err = anyhow!(err).context(format!(
                    r#"Failed to retrieve author with id "{}""#,
                    req.id()
                ));
                ListAuthorBooksError::Other(err)
            })?;
        if author_id.is_none() {
            return Err(ListAuthorBooksError::NotFound { id: req.id() });
        }

        let rows: Vec<BookAuthorRow> = sqlx::query_as(
            "SELECT b.id, b.title, b.price, b.status, ba.author_id \
             FROM books b \
             JOIN book_authors ba ON ba.book_id = b.id \
             WHERE b.id IN (SELECT book_id FROM book_authors WHERE author_id = ?) \
             ORDER BY b.id, ba.author_order",
        )
        .bind(req.id())
        .fetch_all(&self.pool)
        .await
        .map_err(|err| {
            let err = anyhow!(err)
                .context(format!(r#"Failed to list books for author "{}""#, req.id()));
            ListAuthorBooksError::Other(err)
        })?;

        Ok(group_book_rows(rows))
    }
}

#[async_trait]
impl BookRepository for DefaultBookRepository {
    async fn create_book(&self, req: &CreateBookRequest) -> Result<Book, CreateBookError> {
        let mut tx = self.pool.begin().await.map_err(|err| {
            CreateBookError::Other(anyhow!(err).context("Failed to begin transaction"))
        })?;

        let all_exist = all_authors_exist(&mut tx, req.authors().ids())
            .await
            .map_err(|err| {
                CreateBookError::Other(anyhow!(err).context("Failed to check author existence"))
            })?;
        if !all_exist {
            return Err(CreateBookError::UnknownAuthors);
        }

        let row: BookRow = sqlx::query_as(
            "INSERT INTO books (title, price, status) VALUES (?, ?, ?) \
             RETURNING id, title, price, status",
        )
        .bind(req.title())
        .bind(req.price().map(|p| p.to_string()))
        .bind(req.status().and_then(PublicationStatus::as_column))
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_constraint_violation(&err) {
                CreateBookError::Conflict(anyhow!(err))
            } else {
                let err =
                    anyhow!(err).context(format!(r#"Failed to create book "{}""#, req.title()));
                CreateBookError::Other(err)
            }
        })?;

        insert_book_authors(&mut tx, row.id, req.authors())
            .await
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    CreateBookError::Conflict(anyhow!(err))
                } else {
                    CreateBookError::Other(anyhow!(err).context("Failed to link book authors"))
                }
            })?;

        tx.commit().await.map_err(|err| {
            CreateBookError::Other(anyhow!(err).context("Failed to commit transaction"))
        })?;

        Ok(Book::new(
            row.id,
            row.title,
            row.price,
            row.status,
            req.authors().clone(),
        ))
    }

    async fn update_book(&self, req: &UpdateBookRequest) -> Result<Book, UpdateBookError> {
        let mut tx = self.pool.begin().await.map_err(|err| {
            UpdateBookError::Other(anyhow!(err).context("Failed to begin transaction"))
        })?;

        let stored: BookRow =
            sqlx::query_as("SELECT id, title, price, status FROM books WHERE id = ?")
                .bind(req.id())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|err| {
                    let err = anyhow!(err)
                        .context(format!(r#"Failed to retrieve book with id "{}""#, req.id()));
                    UpdateBookError::Other(err)
                })?
                .ok_or(UpdateBookError::NotFound { id: req.id() })?;

        let stored_authors = stored_author_order(&mut tx, req.id()).await.map_err(|err| {
            let err =
                anyhow!(err).context(format!(r#"Failed to load authors of book "{}""#, req.id()));
            UpdateBookError::Other(err)
        })?;
        let current = Book::new(
            stored.id,
            stored.title,
            stored.price,
            stored.status,
            AuthorList::new_unchecked(stored_authors),
        );

        let patch = req.patch();

        // All validation runs before the first write.
        if let Some(authors) = patch.authors() {
            let all_exist = all_authors_exist(&mut tx, authors.ids()).await.map_err(|err| {
                UpdateBookError::Other(anyhow!(err).context("Failed to check author existence"))
            })?;
            if !all_exist {
                return Err(UpdateBookError::UnknownAuthors);
            }
        }

        let merged = patch.merge(&current);

        if let Some(authors) = patch.authors() {
            replace_book_authors(&mut tx, req.id(), authors)
                .await
                .map_err(|err| {
                    if is_constraint_violation(&err) {
                        UpdateBookError::Conflict(anyhow!(err))
                    } else {
                        UpdateBookError::Other(anyhow!(err).context("Failed to relink book authors"))
                    }
                })?;
        }

        let row = if patch.has_scalar_fields() {
            sqlx::query_as::<_, BookRow>(
                "UPDATE books SET title = ?, price = ?, status = ? WHERE id = ? \
                 RETURNING id, title, price, status",
            )
            .bind(merged.title())
            .bind(merged.price().map(|p| p.to_string()))
            .bind(merged.status().as_column())
            .bind(merged.id())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    UpdateBookError::Conflict(anyhow!(err))
                } else {
                    let err = anyhow!(err)
                        .context(format!(r#"Failed to update book with id "{}""#, req.id()));
                    UpdateBookError::Other(err)
                }
            })?
            .ok_or(UpdateBookError::LostUpdate { id: req.id() })?
        } else {
            BookRow {
                id: current.id(),
                title: current.title().to_string(),
                price: current.price(),
                status: current.status(),
            }
        };

        tx.commit().await.map_err(|err| {
            UpdateBookError::Other(anyhow!(err).context("Failed to commit transaction"))
        })?;

        Ok(Book::new(
            row.id,
            row.title,
            row.price,
            row.status,
            merged.authors().clone(),
        ))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.is_unique_violation();
    }

    false
}

fn is_constraint_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return !matches!(db_err.kind(), sqlx::error::ErrorKind::Other);
    }

    false
}
