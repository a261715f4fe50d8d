//! Document repository over one MongoDB collection.
//!
//! # Responsibility
//! - Turn filters into match documents and projections into inclusion maps.
//! - Offer sorted, batched and lazily iterated reads for large collections.
//!
//! # Invariants
//! - No primary keys: any field, typically `_id`, may address a document.
//! - Writes are immediate; `commit` has nothing to do.
//! - Empty payloads to `add*`/`delete*` are usage errors.

use crate::db::MongoConnection;
use crate::lifecycle::Lifecycle;
use crate::repo::contract::{RepoError, RepoResult, Repository, UsageError};
use crate::repo::query::{Filter, Projection};
use log::debug;
use mongodb::bson::{doc, Bson, Document};
use mongodb::sync::{Collection, Cursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn direction(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Read options for [`MongoRepository::search_with`] and
/// [`MongoRepository::cursor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub projection: Option<Projection>,
    pub sort: Option<(String, SortOrder)>,
    /// Documents fetched per server round trip.
    pub batch_size: Option<u32>,
}

impl SearchOptions {
    pub fn projected(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }
}

/// Builds `{field: 1, ...}` from a projection.
pub fn projection_document(projection: &Projection) -> Document {
    projection
        .fields()
        .iter()
        .map(|field| (field.clone(), Bson::Int32(1)))
        .collect()
}

/// Builds the match document for a filter.
pub fn filter_document(filter: &Filter<Bson>) -> Document {
    filter
        .iter()
        .map(|(field, value)| (field.to_string(), value.clone()))
        .collect()
}

fn sort_document(field: &str, order: SortOrder) -> Document {
    let mut sort = Document::new();
    sort.insert(field, order.direction());
    sort
}

/// Lazily fetched query results.
pub struct DocumentCursor {
    inner: Cursor<Document>,
}

impl Iterator for DocumentCursor {
    type Item = RepoResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|item| item.map_err(RepoError::from))
    }
}

/// Repository over one collection of loosely typed documents.
#[derive(Debug)]
pub struct MongoRepository {
    connection: MongoConnection,
    owns_connection: bool,
    db_name: String,
    collection_name: String,
}

impl MongoRepository {
    /// Shares an existing connection; its owner stays responsible for it.
    pub fn new(
        connection: MongoConnection,
        db_name: impl Into<String>,
        collection_name: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            owns_connection: false,
            db_name: db_name.into(),
            collection_name: collection_name.into(),
        }
    }

    /// Opens a connection owned by the repository.
    pub fn connect(
        server: &str,
        port: u16,
        db_name: impl Into<String>,
        collection_name: impl Into<String>,
    ) -> RepoResult<Self> {
        let connection = MongoConnection::connect(server, port)?;
        let mut repository = Self::new(connection, db_name, collection_name);
        repository.owns_connection = true;
        Ok(repository)
    }

    pub fn connection(&self) -> &MongoConnection {
        &self.connection
    }

    pub fn owns_connection(&self) -> bool {
        self.owns_connection
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Like [`Repository::search`] with optional projection, sort and
    /// batch size. An empty projection here means "whole documents".
    pub fn search_with(
        &self,
        filter: &Filter<Bson>,
        options: &SearchOptions,
    ) -> RepoResult<Vec<Document>> {
        self.cursor(filter, options)?.collect()
    }

    /// Opens a server-side cursor; documents are fetched as iterated.
    pub fn cursor(
        &self,
        filter: &Filter<Bson>,
        options: &SearchOptions,
    ) -> RepoResult<DocumentCursor> {
        let collection = self.collection()?;
        debug!(
            "event=mongo_query module=repo op=find collection={} filter_fields={}",
            self.collection_name,
            filter.len()
        );

        let mut find = collection.find(filter_document(filter));
        if let Some(projection) = options.projection.as_ref().filter(|p| !p.is_empty()) {
            find = find.projection(projection_document(projection));
        }
        if let Some((field, order)) = &options.sort {
            find = find.sort(sort_document(field, *order));
        }
        if let Some(size) = options.batch_size {
            find = find.batch_size(size);
        }

        Ok(DocumentCursor { inner: find.run()? })
    }

    fn collection(&self) -> RepoResult<Collection<Document>> {
        Ok(self
            .connection
            .database(&self.db_name)?
            .collection::<Document>(&self.collection_name))
    }

    fn find_one(
        &self,
        filter: &Filter<Bson>,
        projection: Option<&Projection>,
        expect: bool,
    ) -> RepoResult<Option<Document>> {
        let collection = self.collection()?;
        let mut find = collection.find_one(filter_document(filter));
        if let Some(projection) = projection {
            find = find.projection(projection_document(projection));
        }

        let found = find.run()?;
        if found.is_none() && expect {
            return Err(RepoError::NotFound {
                collection: self.collection_name.clone(),
                keys: filter.describe(Bson::to_string),
            });
        }
        Ok(found)
    }

    fn delete_one(&self, query: Document) -> RepoResult<()> {
        let removed = self.collection()?.delete_one(query).run()?.deleted_count;
        debug!(
            "event=mongo_delete module=repo collection={} removed={}",
            self.collection_name, removed
        );
        Ok(())
    }
}

impl Lifecycle for MongoRepository {
    fn reinitialize(&mut self) -> RepoResult<()> {
        if self.owns_connection {
            self.connection.reopen()?;
        }
        Ok(())
    }

    fn dispose(&mut self) -> RepoResult<()> {
        if self.owns_connection {
            self.connection.close();
        } else {
            debug!(
                concat!(
                    "event=repo_dispose module=repo collection={} ",
                    "status=skipped reason=shared_connection"
                ),
                self.collection_name
            );
        }
        Ok(())
    }
}

impl Repository for MongoRepository {
    type Record = Document;
    type Value = Bson;
    type Row = Document;

    fn add(&self, item: Document) -> RepoResult<()> {
        if item.is_empty() {
            return Err(UsageError::NothingToAdd.into());
        }
        self.collection()?.insert_one(item).run()?;
        Ok(())
    }

    fn add_many(&self, items: Vec<Document>) -> RepoResult<()> {
        if items.is_empty() {
            return Err(UsageError::NothingToAdd.into());
        }
        items.into_iter().try_for_each(|item| self.add(item))
    }

    fn all(&self) -> RepoResult<Vec<Document>> {
        self.search(&Filter::new())
    }

    fn all_projected(&self, projection: &Projection) -> RepoResult<Vec<Document>> {
        self.search_projected(projection, &Filter::new())
    }

    fn commit(&self) -> RepoResult<()> {
        Ok(())
    }

    fn count(&self) -> RepoResult<u64> {
        Ok(self.collection()?.count_documents(doc! {}).run()?)
    }

    fn delete(&self, item: &Document) -> RepoResult<()> {
        if item.is_empty() {
            return Err(UsageError::NothingToDelete.into());
        }
        self.delete_one(item.clone())
    }

    fn delete_many(&self, items: &[Document]) -> RepoResult<()> {
        if items.is_empty() {
            return Err(UsageError::NothingToDelete.into());
        }
        items.iter().try_for_each(|item| self.delete(item))
    }

    fn delete_where(&self, filter: &Filter<Bson>) -> RepoResult<()> {
        if filter.is_empty() {
            return Err(UsageError::NothingToDelete.into());
        }
        self.delete_one(filter_document(filter))
    }

    fn delete_all_records(&self) -> RepoResult<u64> {
        Ok(self.collection()?.delete_many(doc! {}).run()?.deleted_count)
    }

    fn get(&self, filter: &Filter<Bson>, expect: bool) -> RepoResult<Option<Document>> {
        self.find_one(filter, None, expect)
    }

    fn get_projected(
        &self,
        projection: &Projection,
        filter: &Filter<Bson>,
        expect: bool,
    ) -> RepoResult<Option<Document>> {
        if projection.is_empty() {
            return Err(UsageError::EmptyProjection.into());
        }
        self.find_one(filter, Some(projection), expect)
    }

    fn search(&self, filter: &Filter<Bson>) -> RepoResult<Vec<Document>> {
        self.search_with(filter, &SearchOptions::default())
    }

    fn search_projected(
        &self,
        projection: &Projection,
        filter: &Filter<Bson>,
    ) -> RepoResult<Vec<Document>> {
        if projection.is_empty() {
            return Err(UsageError::EmptyProjection.into());
        }
        self.search_with(filter, &SearchOptions::default().projected(projection.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::{filter_document, projection_document, sort_document, SearchOptions, SortOrder};
    use crate::repo::query::{Filter, Projection};
    use mongodb::bson::{doc, Bson};

    #[test]
    fn projection_document_includes_each_field() {
        let projection = Projection::of(["_id", "name"]);
        assert_eq!(projection_document(&projection), doc! { "_id": 1, "name": 1 });
    }

    #[test]
    fn empty_projection_document_is_empty() {
        assert!(projection_document(&Projection::default()).is_empty());
    }

    #[test]
    fn filter_document_keeps_order_and_types() {
        let filter: Filter<Bson> = Filter::by("name", "def").eq("rank", 3);
        let document = filter_document(&filter);

        assert_eq!(document, doc! { "name": "def", "rank": 3 });
        let keys: Vec<_> = document.keys().cloned().collect();
        assert_eq!(keys, vec!["name".to_string(), "rank".to_string()]);
    }

    #[test]
    fn sort_document_uses_direction() {
        assert_eq!(sort_document("name", SortOrder::Ascending), doc! { "name": 1 });
        assert_eq!(sort_document("name", SortOrder::Descending), doc! { "name": -1 });
    }

    #[test]
    fn search_options_builder_sets_fields() {
        let options = SearchOptions::default()
            .projected(Projection::of(["_id"]))
            .sorted_by("_id", SortOrder::Descending)
            .batch_size(100);

        assert_eq!(options.projection, Some(Projection::of(["_id"])));
        assert_eq!(options.sort, Some(("_id".to_string(), SortOrder::Descending)));
        assert_eq!(options.batch_size, Some(100));
    }
}
