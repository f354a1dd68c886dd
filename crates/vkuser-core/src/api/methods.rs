//! Catalog of remote methods, one enum per category.
//!
//! Parameters stay untyped (`Params`); the catalog only pins down method
//! names and which of them are cacheable reads.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodCategory {
    Profile,
    Wall,
    Photos,
    Friends,
    Groups,
}

macro_rules! method_catalog {
    (
        $(#[$meta:meta])*
        $enum:ident => $category:ident {
            $($variant:ident => $name:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $enum {
            $($variant),+
        }

        impl $enum {
            pub const ALL: &'static [$enum] = &[$($enum::$variant),+];

            pub fn name(&self) -> &'static str {
                match self {
                    $($enum::$variant => $name),+
                }
            }
        }

        impl From<$enum> for ApiMethod {
            fn from(method: $enum) -> Self {
                ApiMethod::$category(method)
            }
        }

        impl From<$enum> for Endpoint {
            fn from(method: $enum) -> Self {
                ApiMethod::$category(method).into()
            }
        }
    };
}

method_catalog! {
    /// `users.*`
    ProfileMethod => Profile {
        Get => "users.get",
        Search => "users.search",
        GetSubscriptions => "users.getSubscriptions",
        GetFollowers => "users.getFollowers",
    }
}

method_catalog! {
    /// `wall.*`
    WallMethod => Wall {
        Get => "wall.get",
        GetById => "wall.getById",
        SavePost => "wall.savePost",
        Post => "wall.post",
        Repost => "wall.repost",
        GetReposts => "wall.getReposts",
        Edit => "wall.edit",
        Delete => "wall.delete",
        Restore => "wall.restore",
        GetComments => "wall.getComments",
        AddComment => "wall.addComment",
        DeleteComment => "wall.deleteComment",
        RestoreComment => "wall.restoreComment",
    }
}

method_catalog! {
    /// `photos.*`
    PhotosMethod => Photos {
        CreateAlbum => "photos.createAlbum",
        EditAlbum => "photos.editAlbum",
        GetAlbums => "photos.getAlbums",
        Get => "photos.get",
        GetAlbumsCount => "photos.getAlbumsCount",
        GetProfile => "photos.getProfile",
        GetById => "photos.getById",
        GetUploadServer => "photos.getUploadServer",
        GetProfileUploadServer => "photos.getProfileUploadServer",
        GetChatUploadServer => "photos.getChatUploadServer",
        SaveProfilePhoto => "photos.saveProfilePhoto",
        SaveWallPhoto => "photos.saveWallPhoto",
        GetWallUploadServer => "photos.getWallUploadServer",
        GetMessagesUploadServer => "photos.getMessagesUploadServer",
        SaveMessagesPhoto => "photos.saveMessagesPhoto",
        Search => "photos.search",
        Save => "photos.save",
        Edit => "photos.edit",
        Move => "photos.move",
        MakeCover => "photos.makeCover",
        ReorderAlbums => "photos.reorderAlbums",
        ReorderPhotos => "photos.reorderPhotos",
        GetAll => "photos.getAll",
        GetUserPhotos => "photos.getUserPhotos",
        DeleteAlbum => "photos.deleteAlbum",
        Delete => "photos.delete",
        ConfirmTag => "photos.confirmTag",
        GetComments => "photos.getComments",
        GetAllComments => "photos.getAllComments",
        CreateComment => "photos.createComment",
        DeleteComment => "photos.deleteComment",
        RestoreComment => "photos.restoreComment",
        EditComment => "photos.editComment",
        GetTags => "photos.getTags",
        PutTag => "photos.putTag",
        RemoveTag => "photos.removeTag",
        GetNewTags => "photos.getNewTags",
    }
}

method_catalog! {
    /// `friends.*`
    FriendsMethod => Friends {
        Get => "friends.get",
        GetOnline => "friends.getOnline",
        GetMutual => "friends.getMutual",
        GetRecent => "friends.getRecent",
        GetRequests => "friends.getRequests",
        Add => "friends.add",
        Edit => "friends.edit",
        Delete => "friends.delete",
        GetLists => "friends.getLists",
        AddList => "friends.addList",
        EditList => "friends.editList",
        DeleteList => "friends.deleteList",
        GetAppUsers => "friends.getAppUsers",
        GetByPhones => "friends.getByPhones",
        DeleteAllRequests => "friends.deleteAllRequests",
        GetSuggestions => "friends.getSuggestions",
        AreFriends => "friends.areFriends",
    }
}

method_catalog! {
    /// `groups.*`
    GroupsMethod => Groups {
        IsMember => "groups.isMember",
        GetById => "groups.getById",
        Get => "groups.get",
        GetMembers => "groups.getMembers",
        Join => "groups.join",
        Leave => "groups.leave",
        Search => "groups.search",
        GetInvites => "groups.getInvites",
        BanUser => "groups.banUser",
        UnbanUser => "groups.unbanUser",
        GetBanned => "groups.getBanned",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    Profile(ProfileMethod),
    Wall(WallMethod),
    Photos(PhotosMethod),
    Friends(FriendsMethod),
    Groups(GroupsMethod),
}

impl ApiMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ApiMethod::Profile(m) => m.name(),
            ApiMethod::Wall(m) => m.name(),
            ApiMethod::Photos(m) => m.name(),
            ApiMethod::Friends(m) => m.name(),
            ApiMethod::Groups(m) => m.name(),
        }
    }

    pub fn category(&self) -> MethodCategory {
        match self {
            ApiMethod::Profile(_) => MethodCategory::Profile,
            ApiMethod::Wall(_) => MethodCategory::Wall,
            ApiMethod::Photos(_) => MethodCategory::Photos,
            ApiMethod::Friends(_) => MethodCategory::Friends,
            ApiMethod::Groups(_) => MethodCategory::Groups,
        }
    }

    /// Whether responses may be served from the cache.
    ///
    /// Reads are the `get*`, `search`, `is*` and `are*` methods. Upload server
    /// lookups hand out one-shot URLs and are never cached.
    pub fn is_read(&self) -> bool {
        let name = self.name();
        let action = name.split_once('.').map(|(_, a)| a).unwrap_or(name);
        if action.contains("UploadServer") {
            return false;
        }
        action.starts_with("get")
            || action == "search"
            || action.starts_with("is")
            || action.starts_with("are")
    }

    pub fn all() -> impl Iterator<Item = ApiMethod> {
        ProfileMethod::ALL
            .iter()
            .map(|&m| ApiMethod::from(m))
            .chain(WallMethod::ALL.iter().map(|&m| ApiMethod::from(m)))
            .chain(PhotosMethod::ALL.iter().map(|&m| ApiMethod::from(m)))
            .chain(FriendsMethod::ALL.iter().map(|&m| ApiMethod::from(m)))
            .chain(GroupsMethod::ALL.iter().map(|&m| ApiMethod::from(m)))
    }

    /// Look up a method by its remote name, e.g. `"wall.get"`.
    pub fn from_name(name: &str) -> Option<ApiMethod> {
        Self::all().find(|m| m.name() == name)
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A remote method to call: a catalog entry or any other method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    name: String,
    cacheable: bool,
}

impl Endpoint {
    /// A method outside the catalog. Never cached.
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cacheable: false,
        }
    }

    /// Catalog entry for `name` if there is one, otherwise a custom endpoint.
    pub fn named(name: &str) -> Self {
        ApiMethod::from_name(name)
            .map(Endpoint::from)
            .unwrap_or_else(|| Endpoint::custom(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }
}

impl From<ApiMethod> for Endpoint {
    fn from(method: ApiMethod) -> Self {
        Self {
            name: method.name().to_string(),
            cacheable: method.is_read(),
        }
    }
}
