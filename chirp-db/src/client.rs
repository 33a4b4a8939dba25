use crate::{
    record::{
        CommentRecord, CredentialsRecord, FollowCountsRecord, LikerRecord, PostRecord, UserRecord,
    },
    store::{DbError, Result, Store},
};
use async_trait::async_trait;
use chirp_common::model::{
    Id,
    auth::BlacklistedToken,
    comment::{Comment, CreateComment, ParentPost},
    post::{CreatePost, Post, PostContent, PostFilter, PostMarker, PostOrdering, PostQuery},
    user::{CreateUser, Credentials, FollowCounts, User, UserMarker, UserRef, Username},
};
use sqlx::{
    PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions, query, query_as, query_scalar,
};
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::debug;

const POST_SELECT: &str = "
    SELECT
        posts.post_id,
        posts.tweet,
        posts.poster_id,
        users.username AS poster_username,
        posts.date_posted,
        posts.edited
    FROM
        posts.posts JOIN users.users ON users.user_id = posts.poster_id
    ";

const COMMENT_SELECT: &str = "
    SELECT
        comments.comment_id,
        comments.main_post_id,
        comments.comment,
        comments.commenter_id,
        users.username AS commenter_username,
        comments.commented
    FROM
        posts.comments JOIN users.users ON users.user_id = comments.commenter_id
    ";

/// [`Store`] backed by PostgreSQL.
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and brings its schema up to date.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        debug!("Database migrations applied");

        Ok(Self::new(pool))
    }

    async fn load_posts(&self, records: Vec<PostRecord>) -> Result<Vec<Post>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<i64> = records.iter().map(|record| record.post_id).collect();

        let liker_records = query_as::<_, LikerRecord>(
            "
            SELECT
                likes.post_id,
                users.user_id,
                users.username
            FROM
                posts.likes JOIN users.users ON users.user_id = likes.user_id
            WHERE
                likes.post_id = ANY($1)
            ORDER BY
                users.user_id
            ",
        )
        .bind(post_ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        let comments_sql = format!(
            "{COMMENT_SELECT}
            WHERE
                comments.main_post_id = ANY($1)
            ORDER BY
                comments.commented DESC, comments.comment_id DESC
            "
        );
        let comment_records = query_as::<_, CommentRecord>(&comments_sql)
            .bind(post_ids.as_slice())
            .fetch_all(&self.pool)
            .await?;

        let mut likers: HashMap<i64, Vec<UserRef>> = HashMap::new();
        for record in liker_records {
            likers
                .entry(record.post_id)
                .or_default()
                .push(record.try_into()?);
        }

        let mut comments: HashMap<i64, Vec<Comment>> = HashMap::new();
        for record in comment_records {
            if let Some(post_id) = record.main_post_id {
                comments.entry(post_id).or_default().push(record.try_into()?);
            }
        }

        records
            .into_iter()
            .map(|record| {
                let post_likers = likers.remove(&record.post_id).unwrap_or_default();
                let post_comments = comments.remove(&record.post_id).unwrap_or_default();

                record
                    .into_post(post_likers, post_comments)
                    .map_err(DbError::from)
            })
            .collect()
    }
}

fn sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn push_post_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: PostFilter) {
    match filter {
        PostFilter::All => {}
        PostFilter::FollowedBy(user_id) => {
            builder
                .push(
                    " WHERE posts.poster_id IN \
                    (SELECT followed_id FROM users.follows WHERE follower_id = ",
                )
                .push_bind(user_id.get())
                .push(")");
        }
        PostFilter::AuthoredBy(user_id) => {
            builder
                .push(" WHERE posts.poster_id = ")
                .push_bind(user_id.get());
        }
        PostFilter::LikedBy(user_id) => {
            builder
                .push(" WHERE posts.post_id IN (SELECT post_id FROM posts.likes WHERE user_id = ")
                .push_bind(user_id.get())
                .push(")");
        }
    }
}

fn post_ordering_clause(ordering: PostOrdering) -> &'static str {
    match ordering {
        PostOrdering::Newest => " ORDER BY posts.date_posted DESC, posts.post_id DESC",
        PostOrdering::MostLiked => {
            " ORDER BY \
            (SELECT COUNT(*) FROM posts.likes WHERE likes.post_id = posts.post_id) DESC, \
            posts.date_posted DESC, posts.post_id DESC"
        }
        PostOrdering::MostCommented => {
            " ORDER BY \
            (SELECT COUNT(*) FROM posts.comments WHERE comments.main_post_id = posts.post_id) DESC, \
            posts.date_posted DESC, posts.post_id DESC"
        }
    }
}

#[async_trait]
impl Store for DbClient {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let result = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (username, password)
            VALUES ($1, $2)
            RETURNING user_id, username, date_joined, is_staff, is_superuser
            ",
        )
        .bind(user.username.get())
        .bind(user.password.as_phc())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record.try_into()?),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(DbError::UsernameTaken(user.username.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_id,
                users.username,
                users.date_joined,
                users.is_staff,
                users.is_superuser
            FROM
                users.users
            WHERE
                users.user_id = $1
            ",
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_id,
                users.username,
                users.date_joined,
                users.is_staff,
                users.is_superuser
            FROM
                users.users
            WHERE
                users.username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<Credentials>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                users.user_id,
                users.username,
                users.date_joined,
                users.is_staff,
                users.is_superuser,
                users.password
            FROM
                users.users
            WHERE
                users.username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(Credentials::try_from).transpose()?;
        Ok(credentials)
    }

    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let deleted = query("DELETE FROM users.users WHERE user_id = $1")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    async fn toggle_follow(
        &self,
        follower: Id<UserMarker>,
        followed: Id<UserMarker>,
    ) -> Result<bool> {
        if follower == followed {
            return Err(DbError::SelfFollow);
        }

        let mut transaction = self.pool.begin().await?;

        let unfollowed = query(
            "DELETE FROM users.follows WHERE follower_id = $1 AND followed_id = $2",
        )
        .bind(follower.get())
        .bind(followed.get())
        .execute(&mut *transaction)
        .await?
        .rows_affected()
            > 0;

        if !unfollowed {
            query(
                "
                INSERT INTO users.follows (follower_id, followed_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(follower.get())
            .bind(followed.get())
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;
        Ok(!unfollowed)
    }

    async fn is_following(
        &self,
        follower: Id<UserMarker>,
        followed: Id<UserMarker>,
    ) -> Result<bool> {
        let following = query_scalar::<_, bool>(
            "
            SELECT EXISTS (
                SELECT 1 FROM users.follows WHERE follower_id = $1 AND followed_id = $2
            )
            ",
        )
        .bind(follower.get())
        .bind(followed.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(following)
    }

    async fn follow_counts(&self, user_id: Id<UserMarker>) -> Result<FollowCounts> {
        let record = query_as::<_, FollowCountsRecord>(
            "
            SELECT
                (SELECT COUNT(*) FROM users.follows WHERE followed_id = $1) AS followers,
                (SELECT COUNT(*) FROM users.follows WHERE follower_id = $1) AS following
            ",
        )
        .bind(user_id.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let (post_id, date_posted) = query_as::<_, (i64, OffsetDateTime)>(
            "
            INSERT INTO posts.posts (tweet, poster_id)
            VALUES ($1, $2)
            RETURNING post_id, date_posted
            ",
        )
        .bind(post.content.get())
        .bind(post.poster.id.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(Post {
            id: post_id.into(),
            poster: post.poster.clone(),
            content: post.content.clone(),
            date_posted,
            edited: false,
            likers: Vec::new(),
            comments: Vec::new(),
        })
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let sql = format!("{POST_SELECT} WHERE posts.post_id = $1");
        let record = query_as::<_, PostRecord>(&sql)
            .bind(post_id.get())
            .fetch_optional(&self.pool)
            .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        Ok(self.load_posts(vec![record]).await?.pop())
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let updated = query("UPDATE posts.posts SET tweet = $2, edited = TRUE WHERE post_id = $1")
            .bind(post_id.get())
            .bind(content.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Ok(None);
        }

        self.fetch_post(post_id).await
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let deleted = query("DELETE FROM posts.posts WHERE post_id = $1")
            .bind(post_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts.posts");
        push_post_filter(&mut builder, filter);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    async fn fetch_posts(&self, post_query: &PostQuery) -> Result<Vec<Post>> {
        let mut builder = QueryBuilder::<Postgres>::new(POST_SELECT);
        push_post_filter(&mut builder, post_query.filter);
        builder
            .push(post_ordering_clause(post_query.ordering))
            .push(" LIMIT ")
            .push_bind(post_query.limit.map(sql_int))
            .push(" OFFSET ")
            .push_bind(sql_int(post_query.offset));

        let records = builder
            .build_query_as::<PostRecord>()
            .fetch_all(&self.pool)
            .await?;

        self.load_posts(records).await
    }

    async fn toggle_like(&self, post_id: Id<PostMarker>, user_id: Id<UserMarker>) -> Result<bool> {
        let mut transaction = self.pool.begin().await?;

        let unliked = query("DELETE FROM posts.likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id.get())
            .bind(user_id.get())
            .execute(&mut *transaction)
            .await?
            .rows_affected()
            > 0;

        if !unliked {
            let inserted = query(
                "
                INSERT INTO posts.likes (post_id, user_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(post_id.get())
            .bind(user_id.get())
            .execute(&mut *transaction)
            .await;

            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(err)) if err.is_foreign_key_violation() => {
                    return Err(DbError::MissingPost(post_id));
                }
                Err(err) => return Err(err.into()),
            }
        }

        transaction.commit().await?;
        Ok(!unliked)
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let result = query_as::<_, (i64, OffsetDateTime)>(
            "
            INSERT INTO posts.comments (main_post_id, comment, commenter_id)
            VALUES ($1, $2, $3)
            RETURNING comment_id, commented
            ",
        )
        .bind(comment.main_post.get())
        .bind(comment.content.get())
        .bind(comment.commenter.id.get())
        .fetch_one(&self.pool)
        .await;

        let (comment_id, commented) = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(err)) if err.is_foreign_key_violation() => {
                return Err(DbError::MissingPost(comment.main_post));
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Comment {
            id: comment_id.into(),
            main_post: ParentPost::Post(comment.main_post),
            commenter: comment.commenter.clone(),
            content: comment.content.clone(),
            commented,
        })
    }

    async fn fetch_user_comments(&self, user_id: Id<UserMarker>) -> Result<Vec<Comment>> {
        let sql = format!(
            "{COMMENT_SELECT}
            WHERE
                comments.commenter_id = $1
            ORDER BY
                comments.commented DESC, comments.comment_id DESC
            "
        );
        let records = query_as::<_, CommentRecord>(&sql)
            .bind(user_id.get())
            .fetch_all(&self.pool)
            .await?;

        let comments: Vec<Comment> = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    async fn blacklist_token(&self, token: &BlacklistedToken) -> Result<bool> {
        let inserted = query(
            "
            INSERT INTO auth.blacklisted_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            ",
        )
        .bind(&token.jti)
        .bind(token.user.get())
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(inserted > 0)
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool> {
        let blacklisted = query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM auth.blacklisted_tokens WHERE jti = $1)",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await?;

        Ok(blacklisted)
    }
}
