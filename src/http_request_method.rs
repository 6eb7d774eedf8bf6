//! The HTTP request methods a placeholder may use.

// https://developer.mozilla.org/en-US/docs/Web/HTTP/Methods

use std::fmt::{self, Display};

use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpRequestMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl Default for HttpRequestMethod {
    fn default() -> Self {
        Self::GET
    }
}

impl HttpRequestMethod {
    /// Case-insensitive.
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::GET),
            "POST" => Ok(Self::POST),
            "PUT" => Ok(Self::PUT),
            "PATCH" => Ok(Self::PATCH),
            "DELETE" => Ok(Self::DELETE),
            _ => bail!("invalid http request method {s:?}")
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GET => "GET",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::PATCH => "PATCH",
            Self::DELETE => "DELETE",
        }
    }
}

impl Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_from_str() -> Result<()> {
        assert_eq!(HttpRequestMethod::from_str("post")?, HttpRequestMethod::POST);
        assert_eq!(HttpRequestMethod::from_str("Patch")?.as_str(), "PATCH");
        assert!(HttpRequestMethod::from_str("HEAD").is_err());
        assert!(HttpRequestMethod::from_str("").is_err());
        Ok(())
    }
}
