//! Relational repository over SQLite.
//!
//! # Responsibility
//! - Translate keyword filters into parameterised equality predicates.
//! - Translate projections into explicit column lists.
//! - Enforce declared primary keys on keyed lookups and deletes.
//!
//! # Invariants
//! - Identifiers in generated SQL come only from `Entity::TABLE` and
//!   `Entity::COLUMNS`; caller field names are matched against that table
//!   and rejected when unknown. Filter values are always bound parameters.
//! - Primary-key validation happens before any SQL is built.
//! - Keyed lookups return at most one record; a second match is an error.
//! - Writes go through the session transaction and persist on `commit`.

use crate::db::{DbError, SqlSession};
use crate::lifecycle::Lifecycle;
use crate::repo::contract::{RepoError, RepoResult, Repository, UsageError};
use crate::repo::query::{Filter, Projection};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Row};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// Mapping between a Rust type and one SQL table.
///
/// `COLUMNS` is the full, ordered list of mapped columns. `from_row` reads
/// a row selected with exactly those columns; `to_values` returns values in
/// the same order.
pub trait Entity: Sized {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn to_values(&self) -> Vec<Value>;
}

/// Tuple of values returned by a projected query, in projection order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRow(Vec<Value>);

impl ProjectedRow {
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    /// Unwraps a one-column row into its value. Rows of any other width
    /// return `None`.
    pub fn into_scalar(self) -> Option<Value> {
        let mut values = self.0;
        if values.len() == 1 {
            values.pop()
        } else {
            None
        }
    }
}

impl From<Vec<Value>> for ProjectedRow {
    fn from(value: Vec<Value>) -> Self {
        Self(value)
    }
}

/// Builder for [`SqlRepository`].
///
/// Exactly one of `connection_string` and `session` must be supplied.
pub struct SqlRepositoryBuilder<E: Entity> {
    primary_keys: Vec<String>,
    connection_string: Option<String>,
    session: Option<SqlSession>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> SqlRepositoryBuilder<E> {
    fn new() -> Self {
        Self {
            primary_keys: Vec::new(),
            connection_string: None,
            session: None,
            _entity: PhantomData,
        }
    }

    pub fn primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Opens a session owned by the repository.
    pub fn connection_string(mut self, value: impl Into<String>) -> Self {
        self.connection_string = Some(value.into());
        self
    }

    /// Shares an existing session; its owner stays responsible for it.
    pub fn session(mut self, session: SqlSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> RepoResult<SqlRepository<E>> {
        let key_indices = resolve_primary_keys::<E>(&self.primary_keys)?;

        let (session, owns_session) = match (self.connection_string, self.session) {
            (None, None) => return Err(UsageError::MissingConnection.into()),
            (Some(_), Some(_)) => return Err(UsageError::ConflictingConnection.into()),
            (Some(connection_string), None) => (SqlSession::open(&connection_string)?, true),
            (None, Some(session)) => (session, false),
        };

        Ok(SqlRepository {
            session,
            owns_session,
            primary_keys: key_indices.iter().map(|&index| E::COLUMNS[index]).collect(),
            key_indices,
            _entity: PhantomData,
        })
    }
}

/// SQLite-backed repository for one entity type.
pub struct SqlRepository<E: Entity> {
    session: SqlSession,
    owns_session: bool,
    primary_keys: Vec<&'static str>,
    /// Positions of `primary_keys` in `E::COLUMNS`.
    key_indices: Vec<usize>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Debug for SqlRepository<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlRepository")
            .field("table", &E::TABLE)
            .field("primary_keys", &self.primary_keys)
            .field("owns_session", &self.owns_session)
            .finish()
    }
}

impl<E: Entity> SqlRepository<E> {
    pub fn builder() -> SqlRepositoryBuilder<E> {
        SqlRepositoryBuilder::new()
    }

    pub fn session(&self) -> &SqlSession {
        &self.session
    }

    pub fn owns_session(&self) -> bool {
        self.owns_session
    }

    pub fn table(&self) -> &'static str {
        E::TABLE
    }

    pub fn primary_keys(&self) -> &[&'static str] {
        &self.primary_keys
    }

    /// Single-field lookup returning the bare value instead of a
    /// one-element [`ProjectedRow`].
    pub fn get_scalar(
        &self,
        field: &str,
        filter: &Filter<Value>,
        expect: bool,
    ) -> RepoResult<Option<Value>> {
        let row = self.get_projected(&Projection::of([field]), filter, expect)?;
        Ok(row.and_then(ProjectedRow::into_scalar))
    }

    fn require_primary_keys(&self, filter: &Filter<Value>) -> RepoResult<()> {
        match self.primary_keys.iter().find(|pk| !filter.contains(pk)) {
            Some(missing) => Err(UsageError::MissingPrimaryKey((*missing).to_string()).into()),
            None => Ok(()),
        }
    }

    fn projected_columns(&self, projection: &Projection) -> RepoResult<Vec<&'static str>> {
        if projection.is_empty() {
            return Err(UsageError::EmptyProjection.into());
        }
        projection
            .fields()
            .iter()
            .map(|field| resolve_column::<E>(field))
            .collect()
    }

    fn select_records(&self, filter: &Filter<Value>, limit: Option<u32>) -> RepoResult<Vec<E>> {
        let (sql, binds) = select_sql::<E>(E::COLUMNS, filter, limit)?;
        debug!("event=sql_query module=repo op=select table={} sql={}", E::TABLE, sql);

        self.session
            .with_connection(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(binds), |row| E::from_row(row))?;
                rows.collect::<rusqlite::Result<Vec<E>>>()
            })
            .map_err(read_error::<E>)
    }

    fn select_projected(
        &self,
        projection: &Projection,
        filter: &Filter<Value>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<ProjectedRow>> {
        let columns = self.projected_columns(projection)?;
        let (sql, binds) = select_sql::<E>(&columns, filter, limit)?;
        debug!("event=sql_query module=repo op=project table={} sql={}", E::TABLE, sql);

        let width = columns.len();
        self.session
            .with_connection(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(binds), |row| {
                    (0..width)
                        .map(|index| row.get::<_, Value>(index))
                        .collect::<rusqlite::Result<Vec<Value>>>()
                        .map(ProjectedRow)
                })?;
                rows.collect::<rusqlite::Result<Vec<ProjectedRow>>>()
            })
            .map_err(read_error::<E>)
    }

    fn single<T>(
        &self,
        rows: Vec<T>,
        filter: &Filter<Value>,
        expect: bool,
    ) -> RepoResult<Option<T>> {
        if rows.len() > 1 {
            return Err(RepoError::MultipleFound {
                collection: E::TABLE.to_string(),
                keys: filter.describe(render_value),
            });
        }
        let found = rows.into_iter().next();
        if found.is_none() && expect {
            return Err(not_found::<E>(filter));
        }
        Ok(found)
    }

    fn delete_matching(&self, filter: &Filter<Value>) -> RepoResult<()> {
        let mut binds = Vec::with_capacity(filter.len());
        let sql = format!(
            "DELETE FROM {}{};",
            quote_ident(E::TABLE),
            where_clause::<E>(filter, &mut binds)?
        );
        debug!("event=sql_query module=repo op=delete table={} sql={}", E::TABLE, sql);

        let changed = self
            .session
            .write(|conn| conn.execute(&sql, params_from_iter(binds)))?;
        if changed == 0 {
            return Err(not_found::<E>(filter));
        }
        Ok(())
    }

    fn key_filter(&self, item: &E) -> RepoResult<Filter<Value>> {
        let values = checked_values(item)?;
        Ok(self
            .key_indices
            .iter()
            .map(|&index| (E::COLUMNS[index], values[index].clone()))
            .collect())
    }
}

impl<E: Entity> Lifecycle for SqlRepository<E> {
    fn reinitialize(&mut self) -> RepoResult<()> {
        if self.owns_session {
            self.session.reopen()?;
        }
        Ok(())
    }

    fn dispose(&mut self) -> RepoResult<()> {
        if !self.owns_session {
            debug!(
                "event=repo_dispose module=repo table={} status=skipped reason=shared_session",
                E::TABLE
            );
            return Ok(());
        }
        self.session.close()?;
        Ok(())
    }
}

impl<E: Entity> Repository for SqlRepository<E> {
    type Record = E;
    type Value = Value;
    type Row = ProjectedRow;

    fn add(&self, item: E) -> RepoResult<()> {
        let values = checked_values(&item)?;
        let placeholders = (1..=values.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            quote_ident(E::TABLE),
            column_list(E::COLUMNS)
        );

        self.session
            .write(|conn| conn.execute(&sql, params_from_iter(values)))?;
        Ok(())
    }

    fn add_many(&self, items: Vec<E>) -> RepoResult<()> {
        for item in items {
            self.add(item)?;
        }
        Ok(())
    }

    fn all(&self) -> RepoResult<Vec<E>> {
        self.select_records(&Filter::new(), None)
    }

    fn all_projected(&self, projection: &Projection) -> RepoResult<Vec<ProjectedRow>> {
        self.select_projected(projection, &Filter::new(), None)
    }

    fn commit(&self) -> RepoResult<()> {
        self.session.commit()?;
        Ok(())
    }

    fn count(&self) -> RepoResult<u64> {
        let sql = format!(
            "SELECT COUNT({}) FROM {};",
            quote_ident(self.primary_keys[0]),
            quote_ident(E::TABLE)
        );
        let count = self
            .session
            .with_connection(|conn| conn.query_row(&sql, [], |row| row.get::<_, i64>(0)))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative count {count} for {}", E::TABLE)))
    }

    fn delete(&self, item: &E) -> RepoResult<()> {
        let filter = self.key_filter(item)?;
        self.delete_matching(&filter)
    }

    fn delete_many(&self, items: &[E]) -> RepoResult<()> {
        if items.is_empty() {
            return Err(UsageError::NothingToDelete.into());
        }
        items.iter().try_for_each(|item| self.delete(item))
    }

    fn delete_where(&self, filter: &Filter<Value>) -> RepoResult<()> {
        if filter.is_empty() {
            return Err(UsageError::NothingToDelete.into());
        }
        self.require_primary_keys(filter)?;
        self.delete_matching(filter)
    }

    fn delete_all_records(&self) -> RepoResult<u64> {
        let sql = format!("DELETE FROM {};", quote_ident(E::TABLE));
        let removed = self.session.write(|conn| conn.execute(&sql, []))?;
        debug!(
            "event=sql_delete_all module=repo table={} removed={}",
            E::TABLE,
            removed
        );
        Ok(removed as u64)
    }

    fn get(&self, filter: &Filter<Value>, expect: bool) -> RepoResult<Option<E>> {
        self.require_primary_keys(filter)?;
        let rows = self.select_records(filter, Some(2))?;
        self.single(rows, filter, expect)
    }

    fn get_projected(
        &self,
        projection: &Projection,
        filter: &Filter<Value>,
        expect: bool,
    ) -> RepoResult<Option<ProjectedRow>> {
        self.require_primary_keys(filter)?;
        let rows = self.select_projected(projection, filter, Some(2))?;
        self.single(rows, filter, expect)
    }

    fn search(&self, filter: &Filter<Value>) -> RepoResult<Vec<E>> {
        self.select_records(filter, None)
    }

    fn search_projected(
        &self,
        projection: &Projection,
        filter: &Filter<Value>,
    ) -> RepoResult<Vec<ProjectedRow>> {
        self.select_projected(projection, filter, None)
    }
}

fn resolve_column<E: Entity>(field: &str) -> RepoResult<&'static str> {
    resolve_column_index::<E>(field).map(|index| E::COLUMNS[index])
}

fn resolve_column_index<E: Entity>(field: &str) -> RepoResult<usize> {
    E::COLUMNS
        .iter()
        .position(|column| *column == field)
        .ok_or_else(|| {
            UsageError::UnknownField {
                entity: E::TABLE.to_string(),
                field: field.to_string(),
            }
            .into()
        })
}

fn resolve_primary_keys<E: Entity>(keys: &[String]) -> RepoResult<Vec<usize>> {
    if keys.is_empty() {
        return Err(UsageError::NoPrimaryKeys.into());
    }
    keys.iter().map(|key| resolve_column_index::<E>(key)).collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(columns: &[&'static str]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds ` WHERE "a" IS ?1 AND "b" IS ?2`, pushing values onto `binds`.
///
/// `IS` keeps equality null-safe, so a `Null` filter value matches NULL.
fn where_clause<E: Entity>(filter: &Filter<Value>, binds: &mut Vec<Value>) -> RepoResult<String> {
    if filter.is_empty() {
        return Ok(String::new());
    }

    let mut conditions = Vec::with_capacity(filter.len());
    for (field, value) in filter.iter() {
        let column = resolve_column::<E>(field)?;
        binds.push(value.clone());
        conditions.push(format!("{} IS ?{}", quote_ident(column), binds.len()));
    }
    Ok(format!(" WHERE {}", conditions.join(" AND ")))
}

fn select_sql<E: Entity>(
    columns: &[&'static str],
    filter: &Filter<Value>,
    limit: Option<u32>,
) -> RepoResult<(String, Vec<Value>)> {
    let mut binds = Vec::with_capacity(filter.len());
    let mut sql = format!(
        "SELECT {} FROM {}{}",
        column_list(columns),
        quote_ident(E::TABLE),
        where_clause::<E>(filter, &mut binds)?
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql.push(';');
    Ok((sql, binds))
}

fn checked_values<E: Entity>(item: &E) -> RepoResult<Vec<Value>> {
    let values = item.to_values();
    if values.len() != E::COLUMNS.len() {
        return Err(RepoError::InvalidData(format!(
            "{} mapped {} values for {} columns",
            E::TABLE,
            values.len(),
            E::COLUMNS.len()
        )));
    }
    Ok(values)
}

fn not_found<E: Entity>(filter: &Filter<Value>) -> RepoError {
    RepoError::NotFound {
        collection: E::TABLE.to_string(),
        keys: filter.describe(render_value),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(number) => number.to_string(),
        Value::Real(number) => number.to_string(),
        Value::Text(text) => format!("'{text}'"),
        Value::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

fn read_error<E: Entity>(err: DbError) -> RepoError {
    match err {
        DbError::Sqlite(
            inner @ (rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)),
        ) => RepoError::InvalidData(format!("{}: {inner}", E::TABLE)),
        other => RepoError::Db(other),
    }
}

#[cfg(test)]
mod tests {
    use super::{quote_ident, render_value, resolve_column, select_sql, Entity, ProjectedRow};
    use crate::repo::contract::{RepoError, UsageError};
    use crate::repo::query::Filter;
    use rusqlite::types::Value;
    use rusqlite::Row;

    struct Probe;

    impl Entity for Probe {
        const TABLE: &'static str = "probes";
        const COLUMNS: &'static [&'static str] = &["id", "label"];

        fn from_row(_row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Probe)
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Integer(1), Value::Null]
        }
    }

    #[test]
    fn select_sql_binds_values_and_quotes_mapped_columns() {
        let filter = Filter::by("label", "x".to_string()).eq("id", 7i64);
        let (sql, binds) = select_sql::<Probe>(Probe::COLUMNS, &filter, Some(1)).unwrap();

        assert_eq!(
            sql,
            concat!(
                "SELECT \"id\", \"label\" FROM \"probes\" ",
                "WHERE \"label\" IS ?1 AND \"id\" IS ?2 LIMIT 1;"
            )
        );
        assert_eq!(binds, vec![Value::Text("x".into()), Value::Integer(7)]);
    }

    #[test]
    fn unmapped_field_never_reaches_sql() {
        let filter = Filter::by("label = 'x' OR 1=1 --", "y".to_string());
        let err = select_sql::<Probe>(Probe::COLUMNS, &filter, None).unwrap_err();

        match err {
            RepoError::Usage(UsageError::UnknownField { entity, field }) => {
                assert_eq!(entity, "probes");
                assert_eq!(field, "label = 'x' OR 1=1 --");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(resolve_column::<Probe>("id").is_ok());
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn scalar_only_for_single_column_rows() {
        let single = ProjectedRow::from(vec![Value::Text("abc".into())]);
        assert_eq!(single.into_scalar(), Some(Value::Text("abc".into())));

        let pair = ProjectedRow::from(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(pair.into_scalar(), None);
    }

    #[test]
    fn render_value_is_readable() {
        assert_eq!(render_value(&Value::Text("ABC".into())), "'ABC'");
        assert_eq!(render_value(&Value::Null), "NULL");
        assert_eq!(render_value(&Value::Blob(vec![1, 2])), "<2 bytes>");
    }
}
