use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use registro_orm::{
    get_many, get_one, Attribute, BeforeQuery, Conditions, Db, DbQuery, EventDispatcher,
    EventListener, MemoryAdapter, Metadata, Model, OrmError, OrmResult, QueryEvent, Record,
    RelationDef, SqlValue,
};

#[derive(Debug, Clone, Default)]
struct Author {
    id: Option<i64>,
    name: String,
}

impl Model for Author {
    fn model_name() -> &'static str {
        "Author"
    }

    fn table_name() -> &'static str {
        "authors"
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.get("id").and_then(SqlValue::as_i64),
            name: record
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert(
            "id".to_string(),
            self.id.map(SqlValue::Int).unwrap_or(SqlValue::Null),
        );
        record.insert("name".to_string(), SqlValue::from(self.name.as_str()));
        record
    }

    fn apply_record(&mut self, record: &Record) {
        if let Some(id) = record.get("id").and_then(SqlValue::as_i64) {
            self.id = Some(id);
        }
        if let Some(name) = record.get("name").and_then(|v| v.as_str()) {
            self.name = name.to_string();
        }
    }

    fn relations() -> Vec<RelationDef> {
        vec![RelationDef::has_many("posts", "Post", "posts", "author_id")]
    }
}

#[derive(Debug, Clone, Default)]
struct Post {
    id: Option<i64>,
    author_id: Option<i64>,
    title: String,
}

impl Model for Post {
    fn model_name() -> &'static str {
        "Post"
    }

    fn table_name() -> &'static str {
        "posts"
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.get("id").and_then(SqlValue::as_i64),
            author_id: record.get("author_id").and_then(SqlValue::as_i64),
            title: record
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert(
            "id".to_string(),
            self.id.map(SqlValue::Int).unwrap_or(SqlValue::Null),
        );
        record.insert(
            "author_id".to_string(),
            self.author_id.map(SqlValue::Int).unwrap_or(SqlValue::Null),
        );
        record.insert("title".to_string(), SqlValue::from(self.title.as_str()));
        record
    }

    fn apply_record(&mut self, record: &Record) {
        if let Some(id) = record.get("id").and_then(SqlValue::as_i64) {
            self.id = Some(id);
        }
        if let Some(author_id) = record.get("author_id").and_then(SqlValue::as_i64) {
            self.author_id = Some(author_id);
        }
        if let Some(title) = record.get("title").and_then(|v| v.as_str()) {
            self.title = title.to_string();
        }
    }

    fn relations() -> Vec<RelationDef> {
        vec![
            RelationDef::belongs_to("author", "Author", "authors", "author_id"),
            RelationDef::has_and_belongs_to_many(
                "tags",
                "Tag",
                "tags",
                "tag_id",
                "post_tags",
                "post_id",
            ),
        ]
    }
}

#[derive(Debug, Clone, Default)]
struct Tag {
    id: Option<i64>,
    label: String,
}

impl Model for Tag {
    fn model_name() -> &'static str {
        "Tag"
    }

    fn table_name() -> &'static str {
        "tags"
    }

    fn from_record(record: &Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.get("id").and_then(SqlValue::as_i64),
            label: record
                .get("label")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert(
            "id".to_string(),
            self.id.map(SqlValue::Int).unwrap_or(SqlValue::Null),
        );
        record.insert("label".to_string(), SqlValue::from(self.label.as_str()));
        record
    }

    fn apply_record(&mut self, record: &Record) {
        if let Some(id) = record.get("id").and_then(SqlValue::as_i64) {
            self.id = Some(id);
        }
        if let Some(label) = record.get("label").and_then(|v| v.as_str()) {
            self.label = label.to_string();
        }
    }
}

fn setup() -> (Db, MemoryAdapter) {
    let adapter = MemoryAdapter::new();
    adapter.register_table(
        Metadata::new(
            "authors",
            None,
            vec![
                Attribute::new("id").primary_key().auto_increment(),
                Attribute::new("name"),
            ],
        )
        .unwrap(),
    );
    adapter.register_table(
        Metadata::new(
            "posts",
            None,
            vec![
                Attribute::new("id").primary_key().auto_increment(),
                Attribute::new("author_id").foreign_key(),
                Attribute::new("title"),
            ],
        )
        .unwrap(),
    );
    adapter.register_table(
        Metadata::new(
            "tags",
            None,
            vec![
                Attribute::new("id").primary_key().auto_increment(),
                Attribute::new("label"),
            ],
        )
        .unwrap(),
    );
    adapter.register_table(
        Metadata::new(
            "post_tags",
            None,
            vec![
                Attribute::new("id").primary_key().auto_increment(),
                Attribute::new("post_id").foreign_key(),
                Attribute::new("tag_id").foreign_key(),
            ],
        )
        .unwrap(),
    );

    let db = Db::new(Arc::new(adapter.clone()));
    (db, adapter)
}

fn row(pairs: Vec<(&str, SqlValue)>) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[tokio::test]
async fn create_assigns_identity_and_writes_it_back() {
    let (db, adapter) = setup();

    let mut author = Author {
        id: None,
        name: "ada".to_string(),
    };
    assert!(db.create(&mut author).await.unwrap());
    assert_eq!(author.id, Some(1));

    let rows = adapter.rows("authors");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&SqlValue::from("ada")));
}

#[tokio::test]
async fn save_routes_between_create_and_update() {
    let (db, adapter) = setup();

    let mut author = Author {
        id: None,
        name: "grace".to_string(),
    };
    assert!(db.save(&mut author).await.unwrap());
    assert_eq!(author.id, Some(1));

    author.name = "grace hopper".to_string();
    assert!(db.save(&mut author).await.unwrap());

    let rows = adapter.rows("authors");
    assert_eq!(rows.len(), 1);

    let reloaded: Author = db.find_by_pk(1i64, true).await.unwrap().unwrap();
    assert_eq!(reloaded.name, "grace hopper");
}

#[tokio::test]
async fn update_on_missing_row_reports_false() {
    let (db, _adapter) = setup();

    let mut ghost = Author {
        id: Some(99),
        name: "nobody".to_string(),
    };
    assert!(!db.update(&mut ghost).await.unwrap());
}

#[tokio::test]
async fn find_by_pk_strictness() {
    let (db, adapter) = setup();
    adapter.seed(
        "authors",
        vec![row(vec![
            ("id", SqlValue::Int(7)),
            ("name", SqlValue::from("ada")),
        ])],
    );

    let found: Option<Author> = db.find_by_pk(7i64, true).await.unwrap();
    assert_eq!(found.unwrap().name, "ada");

    let missing: Option<Author> = db.find_by_pk(8i64, false).await.unwrap();
    assert!(missing.is_none());

    let err = db.find_by_pk::<Author>(8i64, true).await.unwrap_err();
    assert!(matches!(err, OrmError::NotFound { ref model } if model == "Author"));
}

#[tokio::test]
async fn find_by_map_conditions() {
    let (db, adapter) = setup();
    adapter.seed(
        "authors",
        vec![
            row(vec![("id", SqlValue::Int(1)), ("name", SqlValue::from("ada"))]),
            row(vec![("id", SqlValue::Int(2)), ("name", SqlValue::from("bob"))]),
        ],
    );

    let found: Option<Author> = db
        .find_by(Conditions::map(vec![("name", SqlValue::from("bob").into())]))
        .await
        .unwrap();
    assert_eq!(found.unwrap().id, Some(2));

    let all: Vec<Author> = db.find_all_by("id = id").await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn hook_veto_skips_the_insert() {
    #[derive(Debug, Default)]
    struct Guarded;

    impl Model for Guarded {
        fn model_name() -> &'static str {
            "Guarded"
        }

        fn table_name() -> &'static str {
            "guarded"
        }

        fn from_record(_record: &Record) -> OrmResult<Self> {
            Ok(Guarded)
        }

        fn to_record(&self) -> Record {
            Record::new()
        }

        fn apply_record(&mut self, _record: &Record) {}

        fn before_create(&mut self) -> bool {
            false
        }
    }

    let (db, _adapter) = setup();
    let mut model = Guarded;
    assert!(!db.create(&mut model).await.unwrap());
}

#[tokio::test]
async fn delete_and_delete_by_pk() {
    let (db, adapter) = setup();
    adapter.seed(
        "authors",
        vec![
            row(vec![("id", SqlValue::Int(1)), ("name", SqlValue::from("a"))]),
            row(vec![("id", SqlValue::Int(2)), ("name", SqlValue::from("b"))]),
        ],
    );

    let first: Author = db.find_by_id(1i64).await.unwrap().unwrap();
    assert!(db.delete(&first).await.unwrap());
    assert_eq!(adapter.rows("authors").len(), 1);

    assert!(db.delete_by_pk::<Author>(2i64).await.unwrap());
    assert!(!db.delete_by_pk::<Author>(2i64).await.unwrap());
    assert!(adapter.rows("authors").is_empty());
}

#[tokio::test]
async fn count_and_exists() {
    let (db, adapter) = setup();
    adapter.seed(
        "authors",
        vec![
            row(vec![("id", SqlValue::Int(1)), ("name", SqlValue::from("a"))]),
            row(vec![("id", SqlValue::Int(2)), ("name", SqlValue::from("b"))]),
        ],
    );

    assert_eq!(db.count::<Author>(None).await.unwrap(), 2);

    let present = Author {
        id: Some(1),
        name: String::new(),
    };
    let absent = Author {
        id: Some(9),
        name: String::new(),
    };
    assert!(db.exists(&present).await.unwrap());
    assert!(!db.exists(&absent).await.unwrap());
}

#[tokio::test]
async fn bulk_update_and_delete() {
    let (db, adapter) = setup();
    adapter.seed(
        "posts",
        vec![
            row(vec![
                ("id", SqlValue::Int(1)),
                ("author_id", SqlValue::Int(1)),
                ("title", SqlValue::from("one")),
            ]),
            row(vec![
                ("id", SqlValue::Int(2)),
                ("author_id", SqlValue::Int(1)),
                ("title", SqlValue::from("two")),
            ]),
            row(vec![
                ("id", SqlValue::Int(3)),
                ("author_id", SqlValue::Int(2)),
                ("title", SqlValue::from("three")),
            ]),
        ],
    );

    let mut data = Record::new();
    data.insert("title".to_string(), SqlValue::from("renamed"));
    let update = DbQuery::new()
        .update(data)
        .and_where("author_id = :author")
        .bind_value("author", 1i64);
    assert_eq!(db.update_all::<Post>(update).await.unwrap(), 2);

    let delete = DbQuery::new()
        .and_where("author_id = :author")
        .bind_value("author", 2i64);
    assert_eq!(db.delete_all::<Post>(delete).await.unwrap(), 1);
    assert_eq!(adapter.rows("posts").len(), 2);
}

#[tokio::test]
async fn pagination_arithmetic_over_real_rows() {
    let (db, adapter) = setup();
    let rows: Vec<Record> = (1..=25)
        .map(|i| {
            row(vec![
                ("id", SqlValue::Int(i)),
                ("name", SqlValue::from(format!("author {i}"))),
            ])
        })
        .collect();
    adapter.seed("authors", rows);

    let page = db
        .query::<Author>()
        .order("id ASC")
        .paginate(2, 10)
        .await
        .unwrap();
    assert_eq!(page.total_items, 25);
    assert_eq!(page.page_count, 3);
    assert_eq!(page.len(), 10);
    assert_eq!(page.items[0].id, Some(11));
    assert_eq!(page.next_page, Some(3));
    assert_eq!(page.previous_page, Some(1));

    let last = db
        .query::<Author>()
        .order("id ASC")
        .paginate(3, 10)
        .await
        .unwrap();
    assert_eq!(last.len(), 5);
    assert_eq!(last.next_page, None);

    let err = db.query::<Author>().paginate(0, 10).await.unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)));
}

#[tokio::test]
async fn belongs_to_resolves_via_target_primary_key() {
    let (db, adapter) = setup();
    adapter.seed(
        "authors",
        vec![row(vec![
            ("id", SqlValue::Int(42)),
            ("name", SqlValue::from("ada")),
        ])],
    );

    let post = Post {
        id: Some(1),
        author_id: Some(42),
        title: "hello".to_string(),
    };
    let author: Option<Author> = get_one(&db, &post, "author", None).await.unwrap();
    assert_eq!(author.unwrap().name, "ada");

    let orphan = Post {
        id: Some(2),
        author_id: None,
        title: "draft".to_string(),
    };
    let none: Option<Author> = get_one(&db, &orphan, "author", None).await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn has_many_and_unknown_relation() {
    let (db, adapter) = setup();
    adapter.seed(
        "posts",
        vec![
            row(vec![
                ("id", SqlValue::Int(1)),
                ("author_id", SqlValue::Int(5)),
                ("title", SqlValue::from("one")),
            ]),
            row(vec![
                ("id", SqlValue::Int(2)),
                ("author_id", SqlValue::Int(6)),
                ("title", SqlValue::from("two")),
            ]),
        ],
    );

    let author = Author {
        id: Some(5),
        name: "ada".to_string(),
    };
    let posts: Vec<Post> = get_many(&db, &author, "posts", None).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "one");

    let unsaved = Author {
        id: None,
        name: "new".to_string(),
    };
    let none: Vec<Post> = get_many(&db, &unsaved, "posts", None).await.unwrap();
    assert!(none.is_empty());

    let err = get_many::<Author, Post>(&db, &author, "reviews", None)
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Author"));
    assert!(message.contains("reviews"));
}

#[tokio::test]
async fn many_to_many_through_junction_table() {
    let (db, adapter) = setup();
    adapter.seed(
        "tags",
        vec![
            row(vec![("id", SqlValue::Int(1)), ("label", SqlValue::from("rust"))]),
            row(vec![("id", SqlValue::Int(2)), ("label", SqlValue::from("sql"))]),
            row(vec![("id", SqlValue::Int(3)), ("label", SqlValue::from("web"))]),
        ],
    );
    adapter.seed(
        "post_tags",
        vec![
            row(vec![
                ("id", SqlValue::Int(1)),
                ("post_id", SqlValue::Int(10)),
                ("tag_id", SqlValue::Int(1)),
            ]),
            row(vec![
                ("id", SqlValue::Int(2)),
                ("post_id", SqlValue::Int(10)),
                ("tag_id", SqlValue::Int(3)),
            ]),
            row(vec![
                ("id", SqlValue::Int(3)),
                ("post_id", SqlValue::Int(11)),
                ("tag_id", SqlValue::Int(2)),
            ]),
        ],
    );

    let post = Post {
        id: Some(10),
        author_id: Some(1),
        title: "t".to_string(),
    };
    let mut tags: Vec<Tag> = get_many(&db, &post, "tags", None).await.unwrap();
    tags.sort_by_key(|t| t.id);
    let labels: Vec<&str> = tags.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(labels, vec!["rust", "web"]);
}

#[tokio::test]
async fn before_query_listener_mutations_take_effect() {
    struct Rewriter;

    #[async_trait]
    impl EventListener for Rewriter {
        async fn before_query(&self, event: &mut BeforeQuery) {
            if let Some(value) = event.parameters.get_mut(":target") {
                *value = SqlValue::from("bob");
            }
        }
    }

    let adapter = MemoryAdapter::new();
    adapter.register_table(
        Metadata::new(
            "authors",
            None,
            vec![
                Attribute::new("id").primary_key().auto_increment(),
                Attribute::new("name"),
            ],
        )
        .unwrap(),
    );
    adapter.seed(
        "authors",
        vec![
            row(vec![("id", SqlValue::Int(1)), ("name", SqlValue::from("alice"))]),
            row(vec![("id", SqlValue::Int(2)), ("name", SqlValue::from("bob"))]),
        ],
    );

    let mut events = EventDispatcher::new();
    events.subscribe(Arc::new(Rewriter));
    let db = Db::with_events(Arc::new(adapter), events);

    let found: Option<Author> = db
        .query::<Author>()
        .and_where("name = :target")
        .bind_value("target", "alice")
        .find()
        .await
        .unwrap();
    assert_eq!(found.unwrap().name, "bob");
}

#[tokio::test]
async fn after_query_reports_row_counts() {
    #[derive(Default)]
    struct Counter {
        rows: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl EventListener for Counter {
        async fn after_query(&self, event: &registro_orm::AfterQuery) {
            self.rows.lock().unwrap().push(event.row_count);
        }
    }

    let (_, adapter) = setup();
    let counter = Arc::new(Counter::default());
    let mut events = EventDispatcher::new();
    events.subscribe(counter.clone());
    let db = Db::with_events(Arc::new(adapter.clone()), events);

    adapter.seed(
        "authors",
        vec![row(vec![("id", SqlValue::Int(1)), ("name", SqlValue::from("a"))])],
    );
    let _: Vec<Author> = db.query::<Author>().find_all().await.unwrap();
    assert_eq!(counter.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn model_queried_carries_the_loaded_rows() {
    #[derive(Default)]
    struct Tap {
        seen: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl EventListener for Tap {
        async fn model_queried(&self, event: &QueryEvent) {
            self.seen
                .lock()
                .unwrap()
                .push((event.model.to_string(), event.rows.len()));
        }
    }

    let (_, adapter) = setup();
    let tap = Arc::new(Tap::default());
    let mut events = EventDispatcher::new();
    events.subscribe(tap.clone());
    let db = Db::with_events(Arc::new(adapter.clone()), events);

    adapter.seed(
        "authors",
        vec![
            row(vec![("id", SqlValue::Int(1)), ("name", SqlValue::from("a"))]),
            row(vec![("id", SqlValue::Int(2)), ("name", SqlValue::from("b"))]),
        ],
    );

    let _: Vec<Author> = db.query::<Author>().find_all().await.unwrap();
    let _: Option<Author> = db.find_by_id(1i64).await.unwrap();

    let seen = tap.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![("Author".to_string(), 2), ("Author".to_string(), 1)]);
}

#[tokio::test]
async fn transaction_commit_rollback_and_caller_abort() {
    let (db, adapter) = setup();

    let committed = db
        .transaction(|| async {
            let mut author = Author {
                id: None,
                name: "kept".to_string(),
            };
            db.create(&mut author).await?;
            Ok(true)
        })
        .await
        .unwrap();
    assert!(committed);
    assert_eq!(adapter.rows("authors").len(), 1);

    let aborted = db
        .transaction(|| async {
            let mut author = Author {
                id: None,
                name: "discarded".to_string(),
            };
            db.create(&mut author).await?;
            Ok(false)
        })
        .await
        .unwrap();
    assert!(!aborted);
    assert_eq!(adapter.rows("authors").len(), 1);

    let failed: OrmResult<bool> = db
        .transaction(|| async {
            let mut author = Author {
                id: None,
                name: "lost".to_string(),
            };
            db.create(&mut author).await?;
            Err(OrmError::Configuration("boom".to_string()))
        })
        .await;
    assert!(failed.is_err());
    assert_eq!(adapter.rows("authors").len(), 1);
}

#[tokio::test]
async fn fetch_objects_yields_json_rows() {
    let (db, adapter) = setup();
    adapter.seed(
        "authors",
        vec![row(vec![
            ("id", SqlValue::Int(1)),
            ("name", SqlValue::from("ada")),
        ])],
    );

    let objects = db.query::<Author>().fetch_objects().await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0]["name"], serde_json::json!("ada"));
    assert_eq!(objects[0]["id"], serde_json::json!(1));
}
