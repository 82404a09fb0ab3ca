use chrono::{FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

// UTC+9; a date counts as "in the future" when it is after today in this zone.
static REFERENCE_ZONE: LazyLock<FixedOffset> =
    LazyLock::new(|| FixedOffset::east_opt(9 * 3600).unwrap());

fn today_in_reference_zone() -> NaiveDate {
    Utc::now().with_timezone(&*REFERENCE_ZONE).date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorName(String);

impl AuthorName {
    pub fn new(raw: &str) -> Result<Self, AuthorNameBlankError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Err(AuthorNameBlankError)
        } else {
            Ok(Self(trimmed.into()))
        }
    }

    pub fn new_unchecked(raw: &str) -> Self {
        Self(raw.into())
    }
}

impl std::fmt::Display for AuthorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
#[error("author name must not be blank")]
pub struct AuthorNameBlankError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthDate(NaiveDate);

impl BirthDate {
    pub fn new(date: NaiveDate) -> Result<Self, BirthDateInFutureError> {
        if date > today_in_reference_zone() {
            Err(BirthDateInFutureError(date))
        } else {
            Ok(Self(date))
        }
    }

    pub const fn new_unchecked(date: NaiveDate) -> Self {
        Self(date)
    }

    pub const fn date(self) -> NaiveDate {
        self.0
    }
}

impl std::fmt::Display for BirthDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug)]
#[error("birth date {0} must not be in the future")]
pub struct BirthDateInFutureError(NaiveDate);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationStatus {
    Unpublished,
    Published,
    Unknown,
}

impl PublicationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpublished => "UNPUBLISHED",
            Self::Published => "PUBLISHED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Column value for storage; `Unknown` is represented as NULL.
    pub const fn as_column(self) -> Option<&'static str> {
        match self {
            Self::Unknown => None,
            other => Some(other.as_str()),
        }
    }

    pub fn from_column(value: Option<&str>) -> Result<Self, InvalidStatusError> {
        match value {
            None => Ok(Self::Unknown),
            Some("UNPUBLISHED") => Ok(Self::Unpublished),
            Some("PUBLISHED") => Ok(Self::Published),
            Some(other) => Err(InvalidStatusError(other.into())),
        }
    }
}

impl std::str::FromStr for PublicationStatus {
    type Err = InvalidStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPUBLISHED" => Ok(Self::Unpublished),
            "PUBLISHED" => Ok(Self::Published),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(InvalidStatusError(s.into())),
        }
    }
}

impl std::fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("invalid status: {0}")]
pub struct InvalidStatusError(String);

/// Ordered author ids for a book. Deduplicated on construction, first
/// occurrence wins, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorList(Vec<i64>);

impl AuthorList {
    pub fn new(ids: Vec<i64>) -> Result<Self, EmptyAuthorListError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let deduped: Vec<i64> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        if deduped.is_empty() {
            Err(EmptyAuthorListError)
        } else {
            Ok(Self(deduped))
        }
    }

    pub const fn new_unchecked(ids: Vec<i64>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[i64] {
        &self.0
    }

    /// Pairs each author id with its 1-based position, the order persisted
    /// on the book-author relationship.
    pub fn ranked(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.0.iter().enumerate().map(|(idx, &id)| (id, idx as i64 + 1))
    }
}

#[derive(Error, Debug)]
#[error("book must have at least one author")]
pub struct EmptyAuthorListError;

#[derive(Debug, Clone)]
pub struct Author {
    id: i64,
    name: AuthorName,
    birth_date: BirthDate,
}

impl Author {
    pub const fn new(id: i64, name: AuthorName, birth_date: BirthDate) -> Self {
        Self {
            id,
            name,
            birth_date,
        }
    }

    pub const fn id(&self) -> i64 {
        self.id
    }

    pub const fn name(&self) -> &AuthorName {
        &self.name
    }

    pub const fn birth_date(&self) -> BirthDate {
        self.birth_date
    }
}

#[derive(Debug, Clone)]
pub struct Book {
    id: i64,
    title: String,
    price: Option<Decimal>,
    status: PublicationStatus,
    authors: AuthorList,
}

impl Book {
    pub const fn new(
        id: i64,
        title: String,
        price: Option<Decimal>,
        status: PublicationStatus,
        authors: AuthorList,
    ) -> Self {
        Self {
            id,
            title,
            price,
            status,
            authors,
        }
    }

    pub const fn id(&self) -> i64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub const fn price(&self) -> Option<Decimal> {
        self.price
    }

    pub const fn status(&self) -> PublicationStatus {
        self.status
    }

    pub const fn authors(&self) -> &AuthorList {
        &self.authors
    }
}

#[derive(Debug)]
pub struct CreateAuthorRequest {
    name: AuthorName,
    birth_date: BirthDate,
}

impl CreateAuthorRequest {
    pub const fn new(name: AuthorName, birth_date: BirthDate) -> Self {
        Self { name, birth_date }
    }

    pub const fn name(&self) -> &AuthorName {
        &self.name
    }

    pub const fn birth_date(&self) -> BirthDate {
        self.birth_date
    }
}

#[derive(Error, Debug)]
pub enum CreateAuthorError {
    #[error("author \"{name}\" already exists")]
    Duplicate { name: String },
    #[error(transparent)]
    Other(anyhow::Error),
}

/// Field-level partial update for an author. At least one field must be
/// present; omitted fields keep their stored value.
#[derive(Debug)]
pub struct AuthorPatch {
    name: Option<AuthorName>,
    birth_date: Option<BirthDate>,
}

impl AuthorPatch {
    pub fn new(
        name: Option<AuthorName>,
        birth_date: Option<BirthDate>,
    ) -> Result<Self, EmptyAuthorPatchError> {
        if name.is_none() && birth_date.is_none() {
            Err(EmptyAuthorPatchError)
        } else {
            Ok(Self { name, birth_date })
        }
    }

    pub const fn name(&self) -> Option<&AuthorName> {
        self.name.as_ref()
    }

    pub const fn birth_date(&self) -> Option<BirthDate> {
        self.birth_date
    }

    pub fn merge(&self, current: &Author) -> Author {
        Author::new(
            current.id(),
            self.name.clone().unwrap_or_else(|| current.name().clone()),
            self.birth_date.unwrap_or(current.birth_date()),
        )
    }
}

#[derive(Error, Debug)]
#[error("nothing to update")]
pub struct EmptyAuthorPatchError;

#[derive(Debug)]
pub struct UpdateAuthorRequest {
    id: i64,
    patch: AuthorPatch,
}

impl UpdateAuthorRequest {
    pub const fn new(id: i64, patch: AuthorPatch) -> Self {
        Self { id, patch }
    }

    pub const fn id(&self) -> i64 {
        self.id
    }

    pub const fn patch(&self) -> &AuthorPatch {
        &self.patch
    }
}

#[derive(Error, Debug)]
pub enum UpdateAuthorError {
    #[error("author with id \"{id}\" does not exist")]
    NotFound { id: i64 },
    #[error("author \"{name}\" already exists")]
    Duplicate { name: String },
    #[error("author with id \"{id}\" was updated concurrently")]
    LostUpdate { id: i64 },
    #[error(transparent)]
    Other(anyhow::Error),
}

#[derive(Debug)]
pub struct ListAuthorBooksRequest {
    id: i64,
}

impl ListAuthorBooksRequest {
    pub const fn new(id: i64) -> Self {
        Self { id }
    }

    pub const fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Error, Debug)]
pub enum ListAuthorBooksError {
    #[error("author with id \"{id}\" does not exist")]
    NotFound { id: i64 },
    #[error(transparent)]
    Other(anyhow::Error),
}

#[derive(Debug)]
pub struct CreateBookRequest {
    title: String,
    authors: AuthorList,
    price: Option<Decimal>,
    status: Option<PublicationStatus>,
}

impl CreateBookRequest {
    pub const fn new(
        title: String,
        authors: AuthorList,
        price: Option<Decimal>,
        status: Option<PublicationStatus>,
    ) -> Self {
        Self {
            title,
            authors,
            price,
            status,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub const fn authors(&self) -> &AuthorList {
        &self.authors
    }

    pub const fn price(&self) -> Option<Decimal> {
        self.price
    }

    pub const fn status(&self) -> Option<PublicationStatus> {
        self.status
    }
}

#[derive(Error, Debug)]
pub enum CreateBookError {
    #[error("one or more authors not found")]
    UnknownAuthors,
    #[error("conflict creating book")]
    Conflict(#[source] anyhow::Error),
    #[error(transparent)]
    Other(anyhow::Error),
}

/// Field-level partial update for a book. Unlike [`AuthorPatch`], the
/// all-absent patch is valid and leaves the book unchanged. A present
/// author list always replaces the stored one wholesale.
#[derive(Debug, Default)]
pub struct BookPatch {
    title: Option<String>,
    authors: Option<AuthorList>,
    price: Option<Decimal>,
    status: Option<PublicationStatus>,
}

impl BookPatch {
    pub const fn new() -> Self {
        Self {
            title: None,
            authors: None,
            price: None,
            status: None,
        }
    }

    pub fn set_title(&mut self, title: String) {
        self.title = Some(title);
    }

    pub fn set_authors(&mut self, authors: AuthorList) {
        self.authors = Some(authors);
    }

    pub fn set_price(&mut self, price: Decimal) {
        self.price = Some(price);
    }

    pub fn set_status(&mut self, status: PublicationStatus) {
        self.status = Some(status);
    }

    pub const fn authors(&self) -> Option<&AuthorList> {
        self.authors.as_ref()
    }

    /// Whether any column of the book row itself changes. The author list
    /// lives on the relationship table and is relinked separately.
    pub const fn has_scalar_fields(&self) -> bool {
        self.title.is_some() || self.price.is_some() || self.status.is_some()
    }

    pub fn merge(&self, current: &Book) -> Book {
        Book::new(
            current.id(),
            self.title
                .clone()
                .unwrap_or_else(|| current.title().to_string()),
            self.price.or(current.price()),
            self.status.unwrap_or(current.status()),
            self.authors
                .clone()
                .unwrap_or_else(|| current.authors().clone()),
        )
    }
}

#[derive(Debug)]
pub struct UpdateBookRequest {
    id: i64,
    patch: BookPatch,
}

impl UpdateBookRequest {
    pub const fn new(id: i64, patch: BookPatch) -> Self {
        Self { id, patch }
    }

    pub const fn id(&self) -> i64 {
        self.id
    }

    pub const fn patch(&self) -> &BookPatch {
        &self.patch
    }
}

#[derive(Error, Debug)]
pub enum UpdateBookError {
    #[error("book with id \"{id}\" does not exist")]
    NotFound { id: i64 },
    #[error("one or more authors not found")]
    UnknownAuthors,
    #[error("book with id \"{id}\" was updated concurrently")]
    LostUpdate { id: i64 },
    #[error("conflict updating book")]
    Conflict(#[source] anyhow::Error),
    #[error(transparent)]
    Other(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    #[test]
    fn author_name_trims_whitespace() {
        let name = AuthorName::new("  Natsume Soseki  ").unwrap();
        assert_eq!(name.to_string(), "Natsume Soseki");
    }

    #[test]
    fn author_name_rejects_blank() {
        assert!(AuthorName::new("").is_err());
        assert!(AuthorName::new("   \t ").is_err());
    }

    #[test]
    fn birth_date_accepts_today_and_past() {
        let today = today_in_reference_zone();
        assert!(BirthDate::new(today).is_ok());
        assert!(BirthDate::new(today - Days::new(365)).is_ok());
    }

    #[test]
    fn birth_date_rejects_future() {
        let tomorrow = today_in_reference_zone() + Days::new(1);
        assert!(BirthDate::new(tomorrow).is_err());
    }

    #[test]
    fn status_parses_known_values() {
        assert_eq!(
            "UNPUBLISHED".parse::<PublicationStatus>().unwrap(),
            PublicationStatus::Unpublished
        );
        assert_eq!(
            "PUBLISHED".parse::<PublicationStatus>().unwrap(),
            PublicationStatus::Published
        );
        assert_eq!(
            "UNKNOWN".parse::<PublicationStatus>().unwrap(),
            PublicationStatus::Unknown
        );
    }

    #[test]
    fn status_rejects_unrecognized_values() {
        assert!("NOT_REAL".parse::<PublicationStatus>().is_err());
        assert!("published".parse::<PublicationStatus>().is_err());
    }

    #[test]
    fn unknown_status_maps_to_null_column() {
        assert_eq!(PublicationStatus::Unknown.as_column(), None);
        assert_eq!(
            PublicationStatus::Published.as_column(),
            Some("PUBLISHED")
        );
        assert_eq!(
            PublicationStatus::from_column(None).unwrap(),
            PublicationStatus::Unknown
        );
    }

    #[test]
    fn author_list_dedups_keeping_first_occurrence() {
        let list = AuthorList::new(vec![3, 1, 3, 2, 1]).unwrap();
        assert_eq!(list.ids(), &[3, 1, 2]);
    }

    #[test]
    fn author_list_rejects_empty() {
        assert!(AuthorList::new(vec![]).is_err());
    }

    #[test]
    fn author_list_ranks_from_one() {
        let list = AuthorList::new(vec![7, 4, 9]).unwrap();
        let ranked: Vec<(i64, i64)> = list.ranked().collect();
        assert_eq!(ranked, vec![(7, 1), (4, 2), (9, 3)]);
    }

    #[test]
    fn author_patch_rejects_all_absent() {
        assert!(AuthorPatch::new(None, None).is_err());
    }

    #[test]
    fn author_patch_merges_present_fields_only() {
        let current = Author::new(
            1,
            AuthorName::new_unchecked("Old Name"),
            BirthDate::new_unchecked(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()),
        );
        let patch = AuthorPatch::new(Some(AuthorName::new("New Name").unwrap()), None).unwrap();
        let merged = patch.merge(&current);
        assert_eq!(merged.id(), 1);
        assert_eq!(merged.name().to_string(), "New Name");
        assert_eq!(merged.birth_date(), current.birth_date());
    }

    #[test]
    fn book_patch_all_absent_is_a_noop_merge() {
        let current = Book::new(
            5,
            "Kokoro".to_string(),
            None,
            PublicationStatus::Unknown,
            AuthorList::new_unchecked(vec![1]),
        );
        let patch = BookPatch::new();
        assert!(!patch.has_scalar_fields());
        let merged = patch.merge(&current);
        assert_eq!(merged.title(), "Kokoro");
        assert_eq!(merged.price(), None);
        assert_eq!(merged.status(), PublicationStatus::Unknown);
        assert_eq!(merged.authors().ids(), &[1]);
    }

    #[test]
    fn book_patch_replaces_authors_wholesale() {
        let current = Book::new(
            5,
            "Kokoro".to_string(),
            Some(Decimal::new(120000, 2)),
            PublicationStatus::Published,
            AuthorList::new_unchecked(vec![1, 2]),
        );
        let mut patch = BookPatch::new();
        patch.set_authors(AuthorList::new(vec![3]).unwrap());
        let merged = patch.merge(&current);
        assert_eq!(merged.authors().ids(), &[3]);
        assert_eq!(merged.title(), "Kokoro");
        assert!(!patch.has_scalar_fields());
    }
}
