//! Slug derivation and validation for post URLs.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("slug `{slug}` may only contain lowercase letters, digits and single hyphens")]
    Malformed { slug: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a base slug from a post title.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Accept `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    let well_formed = !slug.is_empty()
        && slug.split('-').all(|part| {
            !part.is_empty() && part.bytes().all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9'))
        });

    if well_formed {
        Ok(())
    } else {
        Err(SlugError::Malformed {
            slug: slug.to_string(),
        })
    }
}

/// Derive a slug from `input`, suffixing `-2`, `-3`, … until `is_unique` accepts it.
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(&base).await.map_err(SlugAsyncError::Predicate)? {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate)
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use std::{convert::Infallible, sync::Arc};

    use tokio::sync::Mutex;

    use super::*;

    #[test]
    fn derive_slug_lowercases_and_hyphenates() {
        assert_eq!(
            derive_slug("  Hello, Lahore Winter!  ").expect("slug"),
            "hello-lahore-winter"
        );
    }

    #[test]
    fn derive_slug_rejects_blank_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn validate_slug_accepts_canonical_forms() {
        assert!(validate_slug("rust-2024").is_ok());
        assert!(validate_slug("a").is_ok());
    }

    #[test]
    fn validate_slug_rejects_malformed_forms() {
        for bad in ["", "-lead", "trail-", "double--dash", "Upper", "with space", "ünï"] {
            assert!(validate_slug(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[tokio::test]
    async fn unique_slug_appends_counter() {
        let existing = Arc::new(Mutex::new(vec!["first-post".to_string()]));

        let slug = generate_unique_slug_async("First Post", |candidate| {
            let existing = existing.clone();
            let candidate = candidate.to_string();
            async move {
                let guard = existing.lock().await;
                Ok::<bool, Infallible>(!guard.contains(&candidate))
            }
        })
        .await
        .expect("unique slug");

        assert_eq!(slug, "first-post-2");
    }

    #[tokio::test]
    async fn unique_slug_exhausts() {
        let result =
            generate_unique_slug_async("Example", |_| async { Ok::<bool, Infallible>(false) })
                .await;
        assert!(matches!(
            result,
            Err(SlugAsyncError::Slug(SlugError::Exhausted { .. }))
        ));
    }
}
