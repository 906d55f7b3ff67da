use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use futures::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, StartupError};
use crate::models::{NewPost, NewUser, Post, PostChanges, PostFilter, User};
use crate::store::{PostRepository, UserRepository, DUPLICATE_EMAIL};
use crate::utils::PaginationParams;

const USERS: &str = "users";
const POSTS: &str = "posts";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Connects and pings the server. Succeeds only once MongoDB has answered.
pub async fn connect(config: &Config) -> Result<MongoStore, StartupError> {
    let uri = config
        .mongo_uri
        .as_deref()
        .ok_or(StartupError::MissingDatabaseUri)?;

    let mut options = ClientOptions::parse(uri).await?;
    options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
    options.server_selection_timeout = Some(config.db_connect_timeout);

    let client = Client::with_options(options)?;
    let db = client
        .default_database()
        .unwrap_or_else(|| client.database(&config.database_name));

    db.run_command(doc! { "ping": 1 }, None).await?;
    info!(database = %db.name(), "Connected to MongoDB");

    let store = MongoStore::new(db);
    store.ensure_indexes().await?;
    Ok(store)
}

#[derive(Debug, Serialize, Deserialize)]
struct UserDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    username: String,
    email: String,
    password_hash: String,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl From<UserDocument> for User {
    fn from(doc: UserDocument) -> Self {
        User {
            id: doc.id.to_hex(),
            username: doc.username,
            email: doc.email,
            password_hash: doc.password_hash,
            created_at: doc.created_at.to_chrono(),
            updated_at: doc.updated_at.to_chrono(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PostDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    title: String,
    content: String,
    author: ObjectId,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl From<PostDocument> for Post {
    fn from(doc: PostDocument) -> Self {
        Post {
            id: doc.id.to_hex(),
            title: doc.title,
            content: doc.content,
            author: doc.author.to_hex(),
            created_at: doc.created_at.to_chrono(),
            updated_at: doc.updated_at.to_chrono(),
        }
    }
}

#[derive(Clone)]
pub struct MongoStore {
    users: Collection<UserDocument>,
    posts: Collection<PostDocument>,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self {
            users: db.collection(USERS),
            posts: db.collection(POSTS),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        let unique_email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users.create_index(unique_email, None).await?;

        let by_author = IndexModel::builder()
            .keys(doc! { "author": 1, "created_at": -1 })
            .build();
        self.posts.create_index(by_author, None).await?;

        debug!("MongoDB indexes ensured");
        Ok(())
    }
}

/// Ids that are not valid ObjectIds cannot match any document.
fn parse_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => false,
    }
}

fn post_filter(filter: &PostFilter) -> Option<Document> {
    match &filter.author {
        None => Some(doc! {}),
        Some(author) => parse_id(author).map(|author| doc! { "author": author }),
    }
}

#[async_trait]
impl UserRepository for MongoStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let now = BsonDateTime::now();
        let document = UserDocument {
            id: ObjectId::new(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            created_at: now,
            updated_at: now,
        };

        match self.users.insert_one(&document, None).await {
            Ok(_) => Ok(document.into()),
            Err(err) if is_duplicate_key(&err) => Err(AppError::Conflict(DUPLICATE_EMAIL.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = self.users.find_one(doc! { "email": email }, None).await?;
        Ok(user.map(User::from))
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let user = self.users.find_one(doc! { "_id": id }, None).await?;
        Ok(user.map(User::from))
    }
}

#[async_trait]
impl PostRepository for MongoStore {
    async fn create_post(&self, new_post: NewPost) -> Result<Post, AppError> {
        let author = parse_id(&new_post.author)
            .ok_or_else(|| AppError::BadRequest("Invalid author id".to_string()))?;

        let now = BsonDateTime::now();
        let document = PostDocument {
            id: ObjectId::new(),
            title: new_post.title,
            content: new_post.content,
            author,
            created_at: now,
            updated_at: now,
        };

        self.posts.insert_one(&document, None).await?;
        Ok(document.into())
    }

    async fn list_posts(
        &self,
        filter: PostFilter,
        page: PaginationParams,
    ) -> Result<(Vec<Post>, u64), AppError> {
        let Some(filter) = post_filter(&filter) else {
            return Ok((Vec::new(), 0));
        };

        let total = self.posts.count_documents(filter.clone(), None).await?;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1, "_id": -1 })
            .skip(page.offset())
            .limit(page.limit as i64)
            .build();

        let posts: Vec<PostDocument> = self.posts.find(filter, options).await?.try_collect().await?;
        Ok((posts.into_iter().map(Post::from).collect(), total))
    }

    async fn find_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let post = self.posts.find_one(doc! { "_id": id }, None).await?;
        Ok(post.map(Post::from))
    }

    async fn update_post(&self, id: &str, changes: PostChanges) -> Result<Option<Post>, AppError> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };

        let mut set = doc! { "updated_at": BsonDateTime::now() };
        if let Some(title) = changes.title {
            set.insert("title", title);
        }
        if let Some(content) = changes.content {
            set.insert("content", content);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let post = self
            .posts
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
            .await?;
        Ok(post.map(Post::from))
    }

    async fn delete_post(&self, id: &str) -> Result<bool, AppError> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        let result = self.posts.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_uri_halts_before_connecting() {
        let err = connect(&Config::default()).await.err().unwrap();
        assert!(matches!(err, StartupError::MissingDatabaseUri));
    }

    #[tokio::test]
    async fn malformed_uri_is_a_database_error() {
        let config = Config {
            mongo_uri: Some("not-a-mongo-uri".to_string()),
            ..Config::default()
        };
        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, StartupError::Database(_)));
    }

    #[test]
    fn author_filter_with_bad_id_matches_nothing() {
        let filter = PostFilter {
            author: Some("not-an-object-id".into()),
        };
        assert!(post_filter(&filter).is_none());
        assert_eq!(post_filter(&PostFilter::default()), Some(doc! {}));
    }
}
