use shared::domain::Category;

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<category-folder>/<epoch-millis>-<sanitized-file-name>`
pub fn object_key(category: Category, uploaded_at_millis: i64, file_name: &str) -> String {
    format!(
        "{}/{uploaded_at_millis}-{}",
        category.storage_folder(),
        sanitize_file_name(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_spaces_and_symbols() {
        assert_eq!(sanitize_file_name("call 1.mp3"), "call_1.mp3");
        assert_eq!(sanitize_file_name("Q4 deck (final)!.pdf"), "Q4_deck__final__.pdf");
        assert_eq!(sanitize_file_name("ok-name_v2.wav"), "ok-name_v2.wav");
        assert_eq!(sanitize_file_name("../etc/passwd"), ".._etc_passwd");
    }

    #[test]
    fn key_uses_category_folder() {
        assert_eq!(
            object_key(Category::Sales, 1714550400000, "call 1.mp3"),
            "recordings/1714550400000-call_1.mp3"
        );
        assert_eq!(
            object_key(Category::Marketing, 5, "deck.pdf"),
            "marketing/5-deck.pdf"
        );
    }
}
