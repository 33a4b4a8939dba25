//! In-process [`Store`] used when no database is configured, and by tests.
//!
//! Every operation holds the state lock for its whole duration, which gives
//! the same all-or-nothing behavior a database transaction gives [`DbClient`].
//!
//! [`DbClient`]: crate::DbClient

use crate::store::{DbError, Result, Store};
use async_trait::async_trait;
use chirp_common::model::{
    Id,
    auth::BlacklistedToken,
    comment::{Comment, CommentContent, CommentMarker, CreateComment, ParentPost},
    password::PasswordDigest,
    post::{CreatePost, Post, PostContent, PostFilter, PostMarker, PostOrdering, PostQuery},
    user::{CreateUser, Credentials, FollowCounts, User, UserMarker, UserRef, Username},
};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    users: BTreeMap<Id<UserMarker>, StoredUser>,
    /// (follower, followed)
    follows: BTreeSet<(Id<UserMarker>, Id<UserMarker>)>,
    posts: BTreeMap<Id<PostMarker>, StoredPost>,
    likes: BTreeSet<(Id<PostMarker>, Id<UserMarker>)>,
    comments: BTreeMap<Id<CommentMarker>, StoredComment>,
    blacklisted_tokens: BTreeMap<String, BlacklistedToken>,
}

#[derive(Clone, Debug)]
struct StoredUser {
    user: User,
    password: PasswordDigest,
}

#[derive(Clone, Debug)]
struct StoredPost {
    poster: Id<UserMarker>,
    content: PostContent,
    date_posted: OffsetDateTime,
    edited: bool,
}

#[derive(Clone, Debug)]
struct StoredComment {
    main_post: ParentPost,
    commenter: Id<UserMarker>,
    content: CommentContent,
    commented: OffsetDateTime,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn next_id<Marker>(&mut self) -> Id<Marker> {
        self.last_id += 1;
        Id::new(self.last_id)
    }

    fn user_ref(&self, user_id: Id<UserMarker>) -> Option<UserRef> {
        self.users.get(&user_id).map(|stored| stored.user.to_ref())
    }

    fn find_user(&self, username: &Username) -> Option<&StoredUser> {
        self.users
            .values()
            .find(|stored| stored.user.username == *username)
    }

    fn likes_of(&self, post_id: Id<PostMarker>) -> impl Iterator<Item = Id<UserMarker>> + '_ {
        self.likes
            .range((post_id, Id::new(i64::MIN))..=(post_id, Id::new(i64::MAX)))
            .map(|&(_, user_id)| user_id)
    }

    fn comment(&self, comment_id: Id<CommentMarker>, stored: &StoredComment) -> Option<Comment> {
        Some(Comment {
            id: comment_id,
            main_post: stored.main_post,
            commenter: self.user_ref(stored.commenter)?,
            content: stored.content.clone(),
            commented: stored.commented,
        })
    }

    /// Comments ordered newest first.
    fn comments_where(&self, predicate: impl Fn(&StoredComment) -> bool) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|(_, stored)| predicate(stored))
            .filter_map(|(&id, stored)| self.comment(id, stored))
            .collect();
        comments.sort_by_key(|comment| Reverse((comment.commented, comment.id)));
        comments
    }

    fn post(&self, post_id: Id<PostMarker>) -> Option<Post> {
        let stored = self.posts.get(&post_id)?;

        Some(Post {
            id: post_id,
            poster: self.user_ref(stored.poster)?,
            content: stored.content.clone(),
            date_posted: stored.date_posted,
            edited: stored.edited,
            likers: self
                .likes_of(post_id)
                .filter_map(|user_id| self.user_ref(user_id))
                .collect(),
            comments: self.comments_where(|comment| comment.main_post.post_id() == Some(post_id)),
        })
    }

    fn matches(&self, post_id: Id<PostMarker>, stored: &StoredPost, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::FollowedBy(user_id) => self.follows.contains(&(user_id, stored.poster)),
            PostFilter::AuthoredBy(user_id) => stored.poster == user_id,
            PostFilter::LikedBy(user_id) => self.likes.contains(&(post_id, user_id)),
        }
    }
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let mut state = self.state();

        if state.find_user(&user.username).is_some() {
            return Err(DbError::UsernameTaken(user.username.clone()));
        }

        let created = User {
            id: state.next_id(),
            username: user.username.clone(),
            date_joined: OffsetDateTime::now_utc(),
            is_staff: false,
            is_superuser: false,
        };
        state.users.insert(
            created.id,
            StoredUser {
                user: created.clone(),
                password: user.password.clone(),
            },
        );

        Ok(created)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.state().users.get(&user_id).map(|stored| stored.user.clone()))
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        Ok(self.state().find_user(username).map(|stored| stored.user.clone()))
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<Credentials>> {
        Ok(self.state().find_user(username).map(|stored| Credentials {
            user: stored.user.clone(),
            password: stored.password.clone(),
        }))
    }

    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let mut state = self.state();

        if state.users.remove(&user_id).is_none() {
            return Ok(false);
        }

        let owned_posts: Vec<Id<PostMarker>> = state
            .posts
            .iter()
            .filter(|(_, post)| post.poster == user_id)
            .map(|(&id, _)| id)
            .collect();
        for post_id in owned_posts {
            state.posts.remove(&post_id);
        }

        let MemoryState {
            follows,
            posts,
            likes,
            comments,
            blacklisted_tokens,
            ..
        } = &mut *state;

        follows.retain(|&(follower, followed)| follower != user_id && followed != user_id);
        likes.retain(|&(post_id, liker)| liker != user_id && posts.contains_key(&post_id));
        comments.retain(|_, comment| comment.commenter != user_id);
        for comment in comments.values_mut() {
            if let Some(post_id) = comment.main_post.post_id()
                && !posts.contains_key(&post_id)
            {
                comment.main_post = ParentPost::Deleted;
            }
        }
        blacklisted_tokens.retain(|_, token| token.user != user_id);

        Ok(true)
    }

    async fn toggle_follow(
        &self,
        follower: Id<UserMarker>,
        followed: Id<UserMarker>,
    ) -> Result<bool> {
        if follower == followed {
            return Err(DbError::SelfFollow);
        }

        let mut state = self.state();
        let edge = (follower, followed);

        if state.follows.remove(&edge) {
            Ok(false)
        } else {
            state.follows.insert(edge);
            Ok(true)
        }
    }

    async fn is_following(
        &self,
        follower: Id<UserMarker>,
        followed: Id<UserMarker>,
    ) -> Result<bool> {
        Ok(self.state().follows.contains(&(follower, followed)))
    }

    async fn follow_counts(&self, user_id: Id<UserMarker>) -> Result<FollowCounts> {
        let state = self.state();
        let mut counts = FollowCounts::default();

        for &(follower, followed) in &state.follows {
            if followed == user_id {
                counts.followers += 1;
            }
            if follower == user_id {
                counts.following += 1;
            }
        }

        Ok(counts)
    }

    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let mut state = self.state();

        let post_id = state.next_id();
        let stored = StoredPost {
            poster: post.poster.id,
            content: post.content.clone(),
            date_posted: OffsetDateTime::now_utc(),
            edited: false,
        };
        let date_posted = stored.date_posted;
        state.posts.insert(post_id, stored);

        Ok(Post {
            id: post_id,
            poster: post.poster.clone(),
            content: post.content.clone(),
            date_posted,
            edited: false,
            likers: Vec::new(),
            comments: Vec::new(),
        })
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.state().post(post_id))
    }

    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>> {
        let mut state = self.state();

        let Some(stored) = state.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        stored.content = content.clone();
        stored.edited = true;

        Ok(state.post(post_id))
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let mut state = self.state();

        if state.posts.remove(&post_id).is_none() {
            return Ok(false);
        }

        state.likes.retain(|&(liked_post, _)| liked_post != post_id);
        for comment in state.comments.values_mut() {
            if comment.main_post == ParentPost::Post(post_id) {
                comment.main_post = ParentPost::Deleted;
            }
        }

        Ok(true)
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let state = self.state();
        let count = state
            .posts
            .iter()
            .filter(|&(&id, post)| state.matches(id, post, filter))
            .count();

        Ok(count as u64)
    }

    async fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let state = self.state();

        let mut posts: Vec<Post> = state
            .posts
            .iter()
            .filter(|&(&id, stored)| state.matches(id, stored, query.filter))
            .filter_map(|(&id, _)| state.post(id))
            .collect();

        posts.sort_by_key(|post| {
            let rank = match query.ordering {
                PostOrdering::Newest => 0,
                PostOrdering::MostLiked => post.likes_count(),
                PostOrdering::MostCommented => post.comments_count(),
            };
            Reverse((rank, post.date_posted, post.id))
        });

        let limit = query.limit.map_or(usize::MAX, saturating_usize);
        Ok(posts
            .into_iter()
            .skip(saturating_usize(query.offset))
            .take(limit)
            .collect())
    }

    async fn toggle_like(&self, post_id: Id<PostMarker>, user_id: Id<UserMarker>) -> Result<bool> {
        let mut state = self.state();

        if !state.posts.contains_key(&post_id) {
            return Err(DbError::MissingPost(post_id));
        }

        let like = (post_id, user_id);
        if state.likes.remove(&like) {
            Ok(false)
        } else {
            state.likes.insert(like);
            Ok(true)
        }
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment> {
        let mut state = self.state();

        if !state.posts.contains_key(&comment.main_post) {
            return Err(DbError::MissingPost(comment.main_post));
        }

        let comment_id = state.next_id();
        let stored = StoredComment {
            main_post: ParentPost::Post(comment.main_post),
            commenter: comment.commenter.id,
            content: comment.content.clone(),
            commented: OffsetDateTime::now_utc(),
        };
        let commented = stored.commented;
        state.comments.insert(comment_id, stored);

        Ok(Comment {
            id: comment_id,
            main_post: ParentPost::Post(comment.main_post),
            commenter: comment.commenter.clone(),
            content: comment.content.clone(),
            commented,
        })
    }

    async fn fetch_user_comments(&self, user_id: Id<UserMarker>) -> Result<Vec<Comment>> {
        Ok(self
            .state()
            .comments_where(|comment| comment.commenter == user_id))
    }

    async fn blacklist_token(&self, token: &BlacklistedToken) -> Result<bool> {
        let mut state = self.state();

        if state.blacklisted_tokens.contains_key(&token.jti) {
            return Ok(false);
        }
        state
            .blacklisted_tokens
            .insert(token.jti.clone(), token.clone());

        Ok(true)
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool> {
        Ok(self.state().blacklisted_tokens.contains_key(jti))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        memory::MemoryStore,
        store::{DbError, Store},
    };
    use chirp_common::model::{
        Id,
        auth::BlacklistedToken,
        comment::{CommentContent, CreateComment, ParentPost},
        password::PasswordDigest,
        post::{CreatePost, Post, PostContent, PostFilter, PostOrdering, PostQuery},
        user::{CreateUser, User, Username},
    };
    use std::sync::LazyLock;
    use time::OffsetDateTime;

    static DIGEST: LazyLock<PasswordDigest> =
        LazyLock::new(|| PasswordDigest::hash("password").unwrap());

    async fn user(store: &MemoryStore, name: &str) -> User {
        store
            .create_user(&CreateUser {
                username: Username::new(name.to_owned()).unwrap(),
                password: DIGEST.clone(),
            })
            .await
            .unwrap()
    }

    async fn post(store: &MemoryStore, poster: &User, text: &str) -> Post {
        store
            .create_post(&CreatePost {
                poster: poster.to_ref(),
                content: PostContent::new(text.to_owned()).unwrap(),
            })
            .await
            .unwrap()
    }

    async fn comment(store: &MemoryStore, commenter: &User, post: &Post, text: &str) {
        store
            .create_comment(&CreateComment {
                main_post: post.id,
                commenter: commenter.to_ref(),
                content: CommentContent::new(text.to_owned()).unwrap(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let store = MemoryStore::new();
        user(&store, "alice").await;

        let duplicate = store
            .create_user(&CreateUser {
                username: Username::new("alice".to_owned()).unwrap(),
                password: DIGEST.clone(),
            })
            .await;

        assert!(matches!(duplicate, Err(DbError::UsernameTaken(_))));
    }

    #[tokio::test]
    async fn credentials_lookup() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;

        let credentials = store
            .fetch_credentials(&alice.username)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credentials.user, alice);
        assert!(credentials.password.verify("password"));

        let unknown = Username::new("nobody".to_owned()).unwrap();
        assert!(store.fetch_credentials(&unknown).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn like_toggles_flip_state() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let hello = post(&store, &alice, "hello").await;

        for n in 1..=5 {
            let liked = store.toggle_like(hello.id, bob.id).await.unwrap();
            assert_eq!(liked, n % 2 == 1);

            let likes = store.fetch_post(hello.id).await.unwrap().unwrap().likes_count();
            assert_eq!(likes, usize::from(liked));
        }

        assert!(matches!(
            store.toggle_like(Id::new(999), bob.id).await,
            Err(DbError::MissingPost(_))
        ));
    }

    #[tokio::test]
    async fn follows() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;

        assert!(matches!(
            store.toggle_follow(alice.id, alice.id).await,
            Err(DbError::SelfFollow)
        ));

        assert!(store.toggle_follow(alice.id, bob.id).await.unwrap());
        assert!(store.is_following(alice.id, bob.id).await.unwrap());
        assert!(!store.is_following(bob.id, alice.id).await.unwrap());

        let bob_counts = store.follow_counts(bob.id).await.unwrap();
        assert_eq!((bob_counts.followers, bob_counts.following), (1, 0));
        let alice_counts = store.follow_counts(alice.id).await.unwrap();
        assert_eq!((alice_counts.followers, alice_counts.following), (0, 1));

        assert!(!store.toggle_follow(alice.id, bob.id).await.unwrap());
        assert_eq!(store.follow_counts(bob.id).await.unwrap().followers, 0);
    }

    #[tokio::test]
    async fn post_filters() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let carol = user(&store, "carol").await;

        post(&store, &alice, "from alice").await;
        let from_bob = post(&store, &bob, "from bob").await;
        post(&store, &carol, "from carol").await;

        store.toggle_follow(alice.id, bob.id).await.unwrap();
        store.toggle_like(from_bob.id, carol.id).await.unwrap();

        assert_eq!(store.count_posts(PostFilter::All).await.unwrap(), 3);

        let followed = store
            .fetch_posts(&PostQuery::all_of(PostFilter::FollowedBy(alice.id)))
            .await
            .unwrap();
        assert_eq!(followed.len(), 1);
        assert_eq!(followed[0].poster.username.get(), "bob");

        let authored = store
            .fetch_posts(&PostQuery::all_of(PostFilter::AuthoredBy(carol.id)))
            .await
            .unwrap();
        assert_eq!(authored.len(), 1);
        assert_eq!(authored[0].content.get(), "from carol");

        let liked = store
            .fetch_posts(&PostQuery::all_of(PostFilter::LikedBy(carol.id)))
            .await
            .unwrap();
        assert_eq!(liked.len(), 1);
        assert_eq!(liked[0].id, from_bob.id);
    }

    #[tokio::test]
    async fn newest_first_with_offset_and_limit() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        for i in 0..25 {
            post(&store, &alice, &format!("post {i}")).await;
        }

        let last_page = store
            .fetch_posts(&PostQuery {
                filter: PostFilter::All,
                ordering: PostOrdering::Newest,
                limit: Some(10),
                offset: 20,
            })
            .await
            .unwrap();

        let texts: Vec<&str> = last_page.iter().map(|post| post.content.get()).collect();
        assert_eq!(texts, ["post 4", "post 3", "post 2", "post 1", "post 0"]);
    }

    #[tokio::test]
    async fn ranking_by_counts() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;

        let quiet = post(&store, &alice, "quiet").await;
        let liked = post(&store, &alice, "liked").await;
        let discussed = post(&store, &alice, "discussed").await;

        store.toggle_like(liked.id, alice.id).await.unwrap();
        store.toggle_like(liked.id, bob.id).await.unwrap();
        store.toggle_like(quiet.id, bob.id).await.unwrap();
        comment(&store, &bob, &discussed, "first").await;
        comment(&store, &alice, &discussed, "second").await;

        let most_liked = store
            .fetch_posts(&PostQuery::top(PostOrdering::MostLiked, 10))
            .await
            .unwrap();
        let ids: Vec<_> = most_liked.iter().map(|post| post.id).collect();
        assert_eq!(ids, [liked.id, quiet.id, discussed.id]);

        let most_commented = store
            .fetch_posts(&PostQuery::top(PostOrdering::MostCommented, 1))
            .await
            .unwrap();
        assert_eq!(most_commented.len(), 1);
        assert_eq!(most_commented[0].id, discussed.id);
        assert_eq!(most_commented[0].comments[0].content.get(), "second");
    }

    #[tokio::test]
    async fn editing_marks_post() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let hello = post(&store, &alice, "hello").await;
        assert!(!hello.edited);

        let edited = store
            .update_post(hello.id, &hello.content)
            .await
            .unwrap()
            .unwrap();
        assert!(edited.edited);
        assert_eq!(edited.content.get(), "hello");

        assert!(
            store
                .update_post(Id::new(999), &hello.content)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn deleting_post_tombstones_comments() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let hello = post(&store, &alice, "hello").await;
        comment(&store, &bob, &hello, "hi alice").await;
        store.toggle_like(hello.id, bob.id).await.unwrap();

        assert!(store.delete_post(hello.id).await.unwrap());
        assert!(!store.delete_post(hello.id).await.unwrap());

        let comments = store.fetch_user_comments(bob.id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].main_post, ParentPost::Deleted);
        assert_eq!(comments[0].content.get(), "hi alice");

        let liked = store
            .fetch_posts(&PostQuery::all_of(PostFilter::LikedBy(bob.id)))
            .await
            .unwrap();
        assert!(liked.is_empty());
    }

    #[tokio::test]
    async fn deleting_user_cascades() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;

        let from_alice = post(&store, &alice, "alice's").await;
        let from_bob = post(&store, &bob, "bob's").await;
        comment(&store, &bob, &from_alice, "on alice's post").await;
        comment(&store, &alice, &from_bob, "on bob's post").await;
        store.toggle_follow(bob.id, alice.id).await.unwrap();

        assert!(store.delete_user(alice.id).await.unwrap());

        assert!(store.fetch_user(alice.id).await.unwrap().is_none());
        assert!(store.fetch_post(from_alice.id).await.unwrap().is_none());
        assert_eq!(store.count_posts(PostFilter::All).await.unwrap(), 1);
        assert_eq!(store.follow_counts(bob.id).await.unwrap().following, 0);

        let bob_post = store.fetch_post(from_bob.id).await.unwrap().unwrap();
        assert!(bob_post.comments.is_empty());

        let bob_comments = store.fetch_user_comments(bob.id).await.unwrap();
        assert_eq!(bob_comments.len(), 1);
        assert_eq!(bob_comments[0].main_post, ParentPost::Deleted);
    }

    #[tokio::test]
    async fn blacklist() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice").await;
        let token = BlacklistedToken {
            jti: "abc".to_owned(),
            user: alice.id,
            expires_at: OffsetDateTime::now_utc(),
        };

        assert!(!store.is_token_blacklisted("abc").await.unwrap());
        assert!(store.blacklist_token(&token).await.unwrap());
        assert!(!store.blacklist_token(&token).await.unwrap());
        assert!(store.is_token_blacklisted("abc").await.unwrap());
    }
}
