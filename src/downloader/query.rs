use crate::spotify::models::Track;

/// Suffixes that hurt search relevance and get stripped from track titles,
/// together with everything after them.
const NOISE_MARKERS: [&str; 4] = [" - ", " (feat", " (with", " ["];

/// Build the `artists - title` search query for a track, with remix and
/// featuring noise trimmed off the title.
pub fn build_search_query(track: &Track) -> String {
    format!("{} - {}", track.artist_names(), clean_title(&track.name))
}

fn clean_title(title: &str) -> String {
    let mut cleaned = title;
    for marker in NOISE_MARKERS {
        if let Some(pos) = cleaned.find(marker) {
            cleaned = &cleaned[..pos];
        }
    }
    cleaned.trim().to_string()
}

/// Reduce a query or track name to characters safe for a filename on every
/// platform we care about.
pub fn safe_download_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || " -_.,()[]".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::models::Artist;

    #[test]
    fn test_query_strips_featuring_suffix() {
        let track = Track::mock("Midnight (feat. Someone)", "Artist", 10);
        assert_eq!(build_search_query(&track), "Artist - Midnight");
    }

    #[test]
    fn test_query_strips_remix_annotations() {
        let track = Track::mock("Midnight - Extended Remix", "Artist", 10);
        assert_eq!(build_search_query(&track), "Artist - Midnight");

        let track = Track::mock("Midnight [Live]", "Artist", 10);
        assert_eq!(build_search_query(&track), "Artist - Midnight");
    }

    #[test]
    fn test_query_joins_all_artists() {
        let mut track = Track::mock("Midnight", "First", 10);
        track.artists.push(Artist {
            name: "Second".to_string(),
            id: "artist_second".to_string(),
        });
        assert_eq!(build_search_query(&track), "First, Second - Midnight");
    }

    #[test]
    fn test_safe_filename_replaces_disallowed_chars() {
        assert_eq!(
            safe_download_filename("AC/DC: Back in Black?"),
            "AC_DC_ Back in Black_"
        );
        assert_eq!(safe_download_filename("Song (Live) [2021]"), "Song (Live) [2021]");
    }
}
