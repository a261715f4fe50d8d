use mongodb::bson::{doc, Bson, Document};
use unistore_core::{
    DbError, Filter, Lifecycle, MongoFacade, MongoRepository, Projection, RepoError, Repository,
    RepositoryFacade, SearchOptions, SortOrder, UsageError,
};

fn offline_repo() -> MongoRepository {
    MongoRepository::connect("localhost", 27017, "unistore_test", "foos").unwrap()
}

fn scratch_collection() -> String {
    format!("foos_{}", uuid::Uuid::new_v4().simple())
}

fn by_name(name: &str) -> Filter<Bson> {
    Filter::by("name", name)
}

#[test]
fn empty_payloads_are_usage_errors() {
    let repo = offline_repo();

    let add = repo.add(doc! {}).unwrap_err();
    let add_many = repo.add_many(Vec::new()).unwrap_err();
    let delete = repo.delete(&doc! {}).unwrap_err();
    let delete_many = repo.delete_many(&[]).unwrap_err();
    let delete_where = repo.delete_where(&Filter::new()).unwrap_err();

    assert!(matches!(add, RepoError::Usage(UsageError::NothingToAdd)));
    assert!(matches!(add_many, RepoError::Usage(UsageError::NothingToAdd)));
    for err in [delete, delete_many, delete_where] {
        assert!(matches!(err, RepoError::Usage(UsageError::NothingToDelete)));
    }
}

#[test]
fn empty_projection_is_usage_error() {
    let repo = offline_repo();

    let search = repo
        .search_projected(&Projection::default(), &Filter::new())
        .unwrap_err();
    let get = repo
        .get_projected(&Projection::default(), &by_name("abc"), false)
        .unwrap_err();

    assert!(matches!(search, RepoError::Usage(UsageError::EmptyProjection)));
    assert!(matches!(get, RepoError::Usage(UsageError::EmptyProjection)));
}

#[test]
fn commit_is_a_noop() {
    assert!(offline_repo().commit().is_ok());
}

#[test]
fn disposed_repository_reports_closed_connection() {
    let mut repo = offline_repo();
    repo.dispose().unwrap();

    let err = repo.count().unwrap_err();

    assert!(matches!(
        err,
        RepoError::Db(DbError::Disposed { backend: "mongodb" })
    ));
}

#[test]
fn enter_reconnects_and_scope_exit_disconnects() {
    let mut repo = offline_repo();
    repo.dispose().unwrap();
    let connection = repo.connection().clone();
    assert!(!connection.is_open());

    {
        let scoped = repo.enter().unwrap();
        assert!(scoped.connection().is_open());
    }

    assert!(!connection.is_open());
}

#[test]
fn shared_connection_survives_repository_dispose() {
    let facade = MongoFacade::connect_default().unwrap();
    let db = facade.database("unistore_test", ["foos", "bars"]);
    let mut foos = db.repository("foos");

    foos.dispose().unwrap();

    assert!(facade.connection().is_open());
    assert!(!foos.owns_connection());
}

#[test]
fn database_facade_exposes_named_collections() {
    let facade = MongoFacade::connect_default().unwrap();
    let db = facade.database("unistore_test", ["foos", "bars"]);

    let names: Vec<_> = db.collection_names().collect();
    assert_eq!(names, vec!["bars", "foos"]);
    assert_eq!(db.collection("foos").unwrap().collection_name(), "foos");
    assert!(db.collection("missing").is_none());
    assert!(db
        .collection("bars")
        .unwrap()
        .connection()
        .same_connection(facade.connection()));
}

#[test]
fn facade_dispose_closes_the_server_connection() {
    let mut facade = MongoFacade::connect_default().unwrap();
    let db = facade.database("unistore_test", ["foos"]);
    facade.commit().unwrap();

    facade.dispose().unwrap();
    let err = db.collection("foos").unwrap().count().unwrap_err();
    assert!(matches!(err, RepoError::Db(DbError::Disposed { .. })));

    facade.reinitialize().unwrap();
    assert!(db.collection("foos").unwrap().connection().is_open());
}

fn live_repo() -> MongoRepository {
    MongoRepository::connect("localhost", 27017, "unistore_test", scratch_collection()).unwrap()
}

fn drop_collection(repo: &MongoRepository) {
    repo.connection()
        .database(repo.db_name())
        .unwrap()
        .collection::<Document>(repo.collection_name())
        .drop()
        .run()
        .unwrap();
}

fn insert_three(repo: &MongoRepository) {
    repo.add_many(vec![
        doc! { "_id": "ABC", "name": "abc" },
        doc! { "_id": "DEF", "name": "def" },
        doc! { "_id": "GHI", "name": "def" },
    ])
    .unwrap();
}

#[test]
#[ignore = "requires a MongoDB server on localhost:27017"]
fn live_add_get_and_exists() {
    let repo = live_repo().enter().unwrap();
    repo.connection().ping().unwrap();

    repo.add(doc! { "_id": "ABC", "name": "abc" }).unwrap();

    assert!(repo.exists(&Filter::by("_id", "ABC")).unwrap());
    let found = repo.get(&Filter::by("_id", "ABC"), true).unwrap();
    assert_eq!(found, Some(doc! { "_id": "ABC", "name": "abc" }));

    let missing = repo.get(&Filter::by("_id", "XYZ"), true).unwrap_err();
    assert!(missing.is_not_found());
    assert_eq!(repo.get(&Filter::by("_id", "XYZ"), false).unwrap(), None);

    drop_collection(&repo);
}

#[test]
#[ignore = "requires a MongoDB server on localhost:27017"]
fn live_search_project_and_count() {
    let repo = live_repo().enter().unwrap();
    insert_three(&repo);

    assert_eq!(repo.count().unwrap(), 3);
    assert_eq!(repo.search(&by_name("def")).unwrap().len(), 2);
    assert_eq!(repo.search(&Filter::new()).unwrap(), repo.all().unwrap());

    let ids = repo
        .search_projected(&Projection::of(["_id"]), &by_name("def"))
        .unwrap();
    assert_eq!(ids, vec![doc! { "_id": "DEF" }, doc! { "_id": "GHI" }]);

    let names = repo
        .get_projected(&Projection::of(["name"]), &Filter::by("_id", "ABC"), true)
        .unwrap();
    assert_eq!(names, Some(doc! { "_id": "ABC", "name": "abc" }));

    drop_collection(&repo);
}

#[test]
#[ignore = "requires a MongoDB server on localhost:27017"]
fn live_sorted_cursor_in_batches() {
    let repo = live_repo().enter().unwrap();
    insert_three(&repo);

    let options = SearchOptions::default()
        .projected(Projection::of(["_id"]))
        .sorted_by("_id", SortOrder::Descending)
        .batch_size(1);
    let ids = repo
        .cursor(&Filter::new(), &options)
        .unwrap()
        .map(|document| document.unwrap().get_str("_id").unwrap().to_string())
        .collect::<Vec<_>>();

    assert_eq!(ids, vec!["GHI", "DEF", "ABC"]);
    drop_collection(&repo);
}

#[test]
#[ignore = "requires a MongoDB server on localhost:27017"]
fn live_deletes() {
    let repo = live_repo().enter().unwrap();
    insert_three(&repo);

    let abc = repo.get(&Filter::by("_id", "ABC"), true).unwrap().unwrap();
    repo.delete(&abc).unwrap();
    assert!(!repo.exists(&Filter::by("_id", "ABC")).unwrap());

    repo.delete_where(&Filter::by("_id", "DEF")).unwrap();
    assert!(!repo.exists(&Filter::by("_id", "DEF")).unwrap());

    repo.delete_where(&Filter::by("_id", "absent")).unwrap();

    let removed = repo.delete_all_records().unwrap();
    assert_eq!(removed, 1);
    assert_eq!(repo.count().unwrap(), 0);
    drop_collection(&repo);
}
