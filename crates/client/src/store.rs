use std::collections::HashSet;

use crewdeck_realtime::{
    ActionType, DiscussionDto, EntityEvent, PostDto, ServerEvent, TeamDto, UserDto,
};
use parking_lot::RwLock;

/// Client-side mirror of the server's object graph: Store -> teams ->
/// discussions -> posts, plus the signed-in user. REST snapshots and
/// realtime events both land here through one reconciliation path, so
/// duplicated and reordered deliveries converge on the same state.
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<Inner>,
}

/// `version` is the emit-time stamp of the last realtime event applied
/// to the slot; 0 means the entity only ever arrived via REST snapshot.
#[derive(Debug, Clone)]
struct Versioned<T> {
    entity: T,
    version: u64,
}

#[derive(Debug)]
struct TeamEntry {
    team: Versioned<TeamDto>,
    discussions: Vec<DiscussionEntry>,
    discussions_loaded: bool,
    is_loading_discussions: bool,
}

#[derive(Debug)]
struct DiscussionEntry {
    discussion: Versioned<DiscussionDto>,
    posts: Vec<Versioned<PostDto>>,
    posts_loaded: bool,
    is_loading_posts: bool,
}

#[derive(Debug, Default)]
struct Inner {
    user: Option<UserDto>,
    teams: Vec<TeamEntry>,
    teams_loaded: bool,
    is_loading_teams: bool,
    deleted_teams: HashSet<String>,
    deleted_discussions: HashSet<String>,
    deleted_posts: HashSet<String>,
}

impl TeamEntry {
    fn new(team: TeamDto, version: u64) -> Self {
        Self {
            team: Versioned {
                entity: team,
                version,
            },
            discussions: Vec::new(),
            discussions_loaded: false,
            is_loading_discussions: false,
        }
    }
}

impl DiscussionEntry {
    fn new(discussion: DiscussionDto, version: u64) -> Self {
        Self {
            discussion: Versioned {
                entity: discussion,
                version,
            },
            posts: Vec::new(),
            posts_loaded: false,
            is_loading_posts: false,
        }
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Session ---------------------------------------------------------

    pub fn set_user(&self, user: UserDto) {
        self.inner.write().user = Some(user);
    }

    pub fn user(&self) -> Option<UserDto> {
        self.inner.read().user.clone()
    }

    /// Drops everything, tombstones included. Used at logout.
    pub fn clear(&self) {
        *self.inner.write() = Inner::default();
    }

    // ---- Reads -----------------------------------------------------------

    pub fn teams(&self) -> Vec<TeamDto> {
        self.inner
            .read()
            .teams
            .iter()
            .map(|entry| entry.team.entity.clone())
            .collect()
    }

    pub fn team(&self, team_id: &str) -> Option<TeamDto> {
        self.inner
            .read()
            .teams
            .iter()
            .find(|entry| entry.team.entity.id == team_id)
            .map(|entry| entry.team.entity.clone())
    }

    pub fn team_by_slug(&self, slug: &str) -> Option<TeamDto> {
        self.inner
            .read()
            .teams
            .iter()
            .find(|entry| entry.team.entity.slug == slug)
            .map(|entry| entry.team.entity.clone())
    }

    pub fn discussions(&self, team_id: &str) -> Vec<DiscussionDto> {
        self.inner
            .read()
            .teams
            .iter()
            .find(|entry| entry.team.entity.id == team_id)
            .map(|entry| {
                entry
                    .discussions
                    .iter()
                    .map(|d| d.discussion.entity.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn discussion(&self, discussion_id: &str) -> Option<DiscussionDto> {
        let inner = self.inner.read();
        find_discussion(&inner.teams, discussion_id).map(|entry| entry.discussion.entity.clone())
    }

    pub fn posts(&self, discussion_id: &str) -> Vec<PostDto> {
        let inner = self.inner.read();
        find_discussion(&inner.teams, discussion_id)
            .map(|entry| entry.posts.iter().map(|p| p.entity.clone()).collect())
            .unwrap_or_default()
    }

    // ---- Loading guards --------------------------------------------------
    //
    // `begin_*` returns false when a load is already in flight or the data
    // is already there, so duplicate loads short-circuit. `abort_*` clears
    // the in-flight flag on a failed load.

    pub fn begin_loading_teams(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.teams_loaded || inner.is_loading_teams {
            return false;
        }
        inner.is_loading_teams = true;
        true
    }

    pub fn abort_loading_teams(&self) {
        self.inner.write().is_loading_teams = false;
    }

    pub fn begin_loading_discussions(&self, team_id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(team) = inner
            .teams
            .iter_mut()
            .find(|entry| entry.team.entity.id == team_id)
        else {
            return false;
        };
        if team.discussions_loaded || team.is_loading_discussions {
            return false;
        }
        team.is_loading_discussions = true;
        true
    }

    pub fn abort_loading_discussions(&self, team_id: &str) {
        let mut inner = self.inner.write();
        if let Some(team) = inner
            .teams
            .iter_mut()
            .find(|entry| entry.team.entity.id == team_id)
        {
            team.is_loading_discussions = false;
        }
    }

    pub fn begin_loading_posts(&self, discussion_id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(entry) = find_discussion_mut(&mut inner.teams, discussion_id) else {
            return false;
        };
        if entry.posts_loaded || entry.is_loading_posts {
            return false;
        }
        entry.is_loading_posts = true;
        true
    }

    pub fn abort_loading_posts(&self, discussion_id: &str) {
        let mut inner = self.inner.write();
        if let Some(entry) = find_discussion_mut(&mut inner.teams, discussion_id) {
            entry.is_loading_posts = false;
        }
    }

    // ---- Snapshots (REST list results) -----------------------------------
    //
    // Snapshots replace the list but keep each surviving entity's loaded
    // subtree and version watermark, so events already applied cannot be
    // replayed against refetched data.

    pub fn set_teams(&self, teams: Vec<TeamDto>) {
        let mut inner = self.inner.write();
        inner.is_loading_teams = false;
        inner.teams_loaded = true;

        let mut previous = std::mem::take(&mut inner.teams);
        let mut merged = Vec::with_capacity(teams.len());
        for team in teams {
            if inner.deleted_teams.contains(&team.id) {
                continue;
            }
            let entry = match previous
                .iter()
                .position(|entry| entry.team.entity.id == team.id)
            {
                Some(i) => {
                    let mut entry = previous.swap_remove(i);
                    entry.team.entity = team;
                    entry
                }
                None => TeamEntry::new(team, 0),
            };
            merged.push(entry);
        }
        sort_teams(&mut merged);
        inner.teams = merged;
    }

    pub fn set_discussions(&self, team_id: &str, discussions: Vec<DiscussionDto>) {
        let mut inner = self.inner.write();
        let Inner {
            ref mut teams,
            ref deleted_discussions,
            ..
        } = *inner;
        let Some(team) = teams
            .iter_mut()
            .find(|entry| entry.team.entity.id == team_id)
        else {
            return;
        };
        team.is_loading_discussions = false;
        team.discussions_loaded = true;

        let mut previous = std::mem::take(&mut team.discussions);
        let mut merged = Vec::with_capacity(discussions.len());
        for discussion in discussions {
            if deleted_discussions.contains(&discussion.id) {
                continue;
            }
            let entry = match previous
                .iter()
                .position(|entry| entry.discussion.entity.id == discussion.id)
            {
                Some(i) => {
                    let mut entry = previous.swap_remove(i);
                    entry.discussion.entity = discussion;
                    entry
                }
                None => DiscussionEntry::new(discussion, 0),
            };
            merged.push(entry);
        }
        sort_discussions(&mut merged);
        team.discussions = merged;
    }

    pub fn set_posts(&self, discussion_id: &str, posts: Vec<PostDto>) {
        let mut inner = self.inner.write();
        let Inner {
            ref mut teams,
            ref deleted_posts,
            ..
        } = *inner;
        let Some(entry) = find_discussion_mut(teams, discussion_id) else {
            return;
        };
        entry.is_loading_posts = false;
        entry.posts_loaded = true;

        let mut previous = std::mem::take(&mut entry.posts);
        let mut merged = Vec::with_capacity(posts.len());
        for post in posts {
            if deleted_posts.contains(&post.id) {
                continue;
            }
            let slot = match previous.iter().position(|slot| slot.entity.id == post.id) {
                Some(i) => {
                    let mut slot = previous.swap_remove(i);
                    slot.entity = post;
                    slot
                }
                None => Versioned {
                    entity: post,
                    version: 0,
                },
            };
            merged.push(slot);
        }
        sort_posts(&mut merged);
        entry.posts = merged;
    }

    // ---- Removals (REST delete results) ----------------------------------

    pub fn remove_team(&self, team_id: &str) {
        remove_team_inner(&mut self.inner.write(), team_id);
    }

    pub fn remove_discussion(&self, discussion_id: &str) {
        remove_discussion_inner(&mut self.inner.write(), discussion_id);
    }

    pub fn remove_post(&self, discussion_id: &str, post_id: &str) {
        remove_post_inner(&mut self.inner.write(), discussion_id, post_id);
    }

    // ---- Reconciliation --------------------------------------------------

    /// Applies one entity event. `added` inserts if absent, `edited`
    /// patches by id (inserting when unseen), `deleted` removes and
    /// tombstones the id so a late event cannot resurrect it. Events with
    /// a non-zero version apply only when newer than the slot's watermark;
    /// version 0 marks a synchronous REST payload, which always applies.
    pub fn apply_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::Team(e) => self.apply_team_event(e),
            ServerEvent::Discussion(e) => self.apply_discussion_event(e),
            ServerEvent::Post(e) => self.apply_post_event(e),
            _ => {}
        }
    }

    fn apply_team_event(&self, event: &EntityEvent<TeamDto>) {
        let mut inner = self.inner.write();
        let id = event.entity.id.clone();
        match event.action_type {
            ActionType::Deleted => remove_team_inner(&mut inner, &id),
            ActionType::Added | ActionType::Edited => {
                if inner.deleted_teams.contains(&id) {
                    return;
                }
                let Some(me) = inner.user.as_ref().map(|user| user.id.clone()) else {
                    return;
                };
                if !event.entity.member_ids.contains(&me) {
                    // No longer a member: the team leaves this mirror.
                    inner.teams.retain(|entry| entry.team.entity.id != id);
                    return;
                }
                match inner
                    .teams
                    .iter()
                    .position(|entry| entry.team.entity.id == id)
                {
                    Some(i) => {
                        if event.action_type == ActionType::Added {
                            return;
                        }
                        let slot = &mut inner.teams[i].team;
                        if event.version != 0 && event.version <= slot.version {
                            return;
                        }
                        slot.entity = event.entity.clone();
                        slot.version = slot.version.max(event.version);
                    }
                    None => {
                        inner
                            .teams
                            .push(TeamEntry::new(event.entity.clone(), event.version));
                        sort_teams(&mut inner.teams);
                    }
                }
            }
        }
    }

    fn apply_discussion_event(&self, event: &EntityEvent<DiscussionDto>) {
        let mut inner = self.inner.write();
        let id = event.entity.id.clone();
        match event.action_type {
            ActionType::Deleted => remove_discussion_inner(&mut inner, &id),
            ActionType::Added | ActionType::Edited => {
                if inner.deleted_discussions.contains(&id) {
                    return;
                }
                let Some(me) = inner.user.as_ref().map(|user| user.id.clone()) else {
                    return;
                };
                let is_member = event.entity.member_ids.contains(&me);
                let Some(team) = inner
                    .teams
                    .iter_mut()
                    .find(|entry| entry.team.entity.id == event.entity.team_id)
                else {
                    return;
                };
                match team
                    .discussions
                    .iter()
                    .position(|entry| entry.discussion.entity.id == id)
                {
                    Some(i) => {
                        if !is_member {
                            // Dropped from the member list: the discussion
                            // leaves this mirror.
                            team.discussions.remove(i);
                            return;
                        }
                        if event.action_type == ActionType::Added {
                            return;
                        }
                        let slot = &mut team.discussions[i].discussion;
                        if event.version != 0 && event.version <= slot.version {
                            return;
                        }
                        slot.entity = event.entity.clone();
                        slot.version = slot.version.max(event.version);
                    }
                    None => {
                        if !is_member {
                            return;
                        }
                        team.discussions
                            .push(DiscussionEntry::new(event.entity.clone(), event.version));
                        sort_discussions(&mut team.discussions);
                    }
                }
            }
        }
    }

    fn apply_post_event(&self, event: &EntityEvent<PostDto>) {
        let mut inner = self.inner.write();
        let id = event.entity.id.clone();
        match event.action_type {
            ActionType::Deleted => {
                remove_post_inner(&mut inner, &event.entity.discussion_id, &id)
            }
            ActionType::Added | ActionType::Edited => {
                if inner.deleted_posts.contains(&id) {
                    return;
                }
                let Some(entry) = find_discussion_mut(&mut inner.teams, &event.entity.discussion_id)
                else {
                    return;
                };
                match entry.posts.iter().position(|slot| slot.entity.id == id) {
                    Some(i) => {
                        if event.action_type == ActionType::Added {
                            return;
                        }
                        let slot = &mut entry.posts[i];
                        if event.version != 0 && event.version <= slot.version {
                            return;
                        }
                        slot.entity = event.entity.clone();
                        slot.version = slot.version.max(event.version);
                    }
                    None => {
                        insert_post(
                            &mut entry.posts,
                            Versioned {
                                entity: event.entity.clone(),
                                version: event.version,
                            },
                        );
                    }
                }
            }
        }
    }
}

fn remove_team_inner(inner: &mut Inner, team_id: &str) {
    inner.deleted_teams.insert(team_id.to_string());
    inner.teams.retain(|entry| entry.team.entity.id != team_id);
}

fn remove_discussion_inner(inner: &mut Inner, discussion_id: &str) {
    inner.deleted_discussions.insert(discussion_id.to_string());
    for team in &mut inner.teams {
        team.discussions
            .retain(|entry| entry.discussion.entity.id != discussion_id);
    }
}

fn remove_post_inner(inner: &mut Inner, discussion_id: &str, post_id: &str) {
    inner.deleted_posts.insert(post_id.to_string());
    if let Some(entry) = find_discussion_mut(&mut inner.teams, discussion_id) {
        entry.posts.retain(|slot| slot.entity.id != post_id);
    }
}

fn find_discussion<'a>(teams: &'a [TeamEntry], discussion_id: &str) -> Option<&'a DiscussionEntry> {
    teams
        .iter()
        .flat_map(|team| team.discussions.iter())
        .find(|entry| entry.discussion.entity.id == discussion_id)
}

fn find_discussion_mut<'a>(
    teams: &'a mut [TeamEntry],
    discussion_id: &str,
) -> Option<&'a mut DiscussionEntry> {
    teams
        .iter_mut()
        .flat_map(|team| team.discussions.iter_mut())
        .find(|entry| entry.discussion.entity.id == discussion_id)
}

fn insert_post(posts: &mut Vec<Versioned<PostDto>>, slot: Versioned<PostDto>) {
    let at = posts.partition_point(|p| {
        (p.entity.created_at, p.entity.id.as_str())
            < (slot.entity.created_at, slot.entity.id.as_str())
    });
    posts.insert(at, slot);
}

fn sort_teams(teams: &mut [TeamEntry]) {
    teams.sort_by(|a, b| {
        (a.team.entity.created_at, a.team.entity.id.as_str())
            .cmp(&(b.team.entity.created_at, b.team.entity.id.as_str()))
    });
}

fn sort_discussions(discussions: &mut [DiscussionEntry]) {
    discussions.sort_by(|a, b| {
        (a.discussion.entity.created_at, a.discussion.entity.id.as_str()).cmp(&(
            b.discussion.entity.created_at,
            b.discussion.entity.id.as_str(),
        ))
    });
}

fn sort_posts(posts: &mut [Versioned<PostDto>]) {
    posts.sort_by(|a, b| {
        (a.entity.created_at, a.entity.id.as_str())
            .cmp(&(b.entity.created_at, b.entity.id.as_str()))
    });
}
