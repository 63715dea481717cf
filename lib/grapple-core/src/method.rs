//! Request methods.

use std::fmt;

/// Method of a [`Request`](crate::Request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `OPTIONS`
    Options,
}

impl Method {
    /// Upper-case token as sent on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    /// Method of the request that follows a redirect with `status`.
    ///
    /// 301 and 302 turn anything but GET and HEAD into GET, 303 turns anything
    /// but HEAD into GET, other statuses keep the method.
    #[must_use]
    pub const fn after_redirect(self, status: u16) -> Self {
        match (status, self) {
            (301 | 302, Self::Get | Self::Head) | (303, Self::Head) => self,
            (301..=303, _) => Self::Get,
            _ => self,
        }
    }

    /// Whether a redirect with `status` re-sends the request body.
    #[must_use]
    pub const fn keeps_body_on_redirect(status: u16) -> bool {
        matches!(status, 307 | 308)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Head => Self::HEAD,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
            Method::Options => Self::OPTIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_token() {
        assert_eq!(Method::Patch.to_string(), "PATCH");
        assert_eq!(
            http::Method::from(Method::Options).as_str(),
            Method::Options.as_str()
        );
    }

    #[test]
    fn moved_and_found_downgrade_to_get() {
        assert_eq!(Method::Post.after_redirect(301), Method::Get);
        assert_eq!(Method::Put.after_redirect(302), Method::Get);
        assert_eq!(Method::Head.after_redirect(302), Method::Head);
        assert_eq!(Method::Get.after_redirect(301), Method::Get);
    }

    #[test]
    fn see_other_keeps_only_head() {
        assert_eq!(Method::Delete.after_redirect(303), Method::Get);
        assert_eq!(Method::Head.after_redirect(303), Method::Head);
    }

    #[test]
    fn temporary_and_permanent_keep_method_and_body() {
        assert_eq!(Method::Post.after_redirect(307), Method::Post);
        assert_eq!(Method::Patch.after_redirect(308), Method::Patch);
        assert!(Method::keeps_body_on_redirect(307));
        assert!(!Method::keeps_body_on_redirect(303));
    }
}
