//! Route label helpers.

use uuid::Uuid;

/// The request path with identifier segments collapsed, for span and metric labels.
pub(super) fn route_template(path: &str) -> String {
    if path == "/" {
        return "/".to_owned();
    }

    let mut template = String::from("/");

    for (index, segment) in path.trim_start_matches('/').split('/').enumerate() {
        if index > 0 {
            template.push('/');
        }

        if Uuid::parse_str(segment).is_ok() {
            template.push_str("{uuid}");
        } else {
            template.push_str(segment);
        }
    }

    template
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_collapse_to_placeholders() {
        let shop = Uuid::now_v7();
        let variant = Uuid::now_v7();

        assert_eq!(
            route_template(&format!("/shops/{shop}/variants/{variant}/fitness")),
            "/shops/{uuid}/variants/{uuid}/fitness"
        );
    }

    #[test]
    fn static_paths_are_unchanged() {
        assert_eq!(route_template("/"), "/");
        assert_eq!(route_template("/healthcheck"), "/healthcheck");
    }
}
