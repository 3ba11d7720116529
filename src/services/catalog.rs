use csv::ReaderBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::error::{ApiError, Result};

/// Resolved track metadata: what the recommendation response is built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
}

/// In-memory song catalog, loaded once from the CSV exports at startup and
/// read-only afterwards.
///
/// Playlists store their track sequences already resolved to [`TrackInfo`]:
/// a membership row whose track identifier is missing from the tracks table is
/// dropped at load time without error, and the drop count is only logged.
/// A playlist keeps its (possibly empty) entry either way, and duplicate
/// memberships are kept in file order.
pub struct Catalog {
    tracks: HashMap<String, TrackInfo>,
    playlist_tracks: HashMap<String, Vec<TrackInfo>>,
    playlist_titles: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TrackRecord {
    track_uri: String,
    track_name: String,
    artist_name: String,
}

#[derive(Debug, Deserialize)]
struct ItemRecord {
    pid: String,
    track_uri: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistRecord {
    pid: String,
    name: String,
}

impl Catalog {
    /// Loads the three CSV exports (tracks, playlist items, playlist names).
    /// Any unreadable file or malformed row aborts the load; only unresolvable
    /// track references are tolerated.
    pub fn load(tracks_csv: &Path, items_csv: &Path, playlists_csv: &Path) -> Result<Self> {
        let tracks = read_tracks(tracks_csv)?;
        let playlist_tracks = read_items(items_csv, &tracks)?;
        let playlist_titles = read_playlists(playlists_csv)?
            .into_iter()
            .collect::<HashMap<_, _>>();

        info!(
            "Catalog ready: {} tracks, {} playlists with items, {} playlist titles",
            tracks.len(),
            playlist_tracks.len(),
            playlist_titles.len()
        );

        Ok(Catalog {
            tracks,
            playlist_tracks,
            playlist_titles,
        })
    }

    pub fn track(&self, track_uri: &str) -> Option<&TrackInfo> {
        self.tracks.get(track_uri)
    }

    /// Resolved track sequence of a playlist, in file order, duplicates kept.
    /// `None` when the playlist never appeared in the items export.
    pub fn playlist_tracks(&self, pid: &str) -> Option<&[TrackInfo]> {
        self.playlist_tracks.get(pid).map(Vec::as_slice)
    }

    pub fn playlist_title(&self, pid: &str) -> Option<&str> {
        self.playlist_titles.get(pid).map(String::as_str)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn playlist_count(&self) -> usize {
        self.playlist_tracks.len()
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        tracks: HashMap<String, TrackInfo>,
        playlist_tracks: HashMap<String, Vec<TrackInfo>>,
        playlist_titles: HashMap<String, String>,
    ) -> Self {
        Catalog {
            tracks,
            playlist_tracks,
            playlist_titles,
        }
    }
}

/// Reads `playlists.csv` as ordered (pid, name) pairs. Shared with the offline
/// embedding builder, which needs a stable iteration order for its output.
pub fn read_playlists(path: &Path) -> Result<Vec<(String, String)>> {
    let mut rdr = csv_reader(path)?;
    let pb = load_spinner("Loading playlist names");

    let mut playlists = Vec::new();
    for result in rdr.deserialize() {
        let record: PlaylistRecord = result?;
        playlists.push((record.pid, record.name));
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("Loaded {} playlist names from {}", playlists.len(), path.display());
    Ok(playlists)
}

fn read_tracks(path: &Path) -> Result<HashMap<String, TrackInfo>> {
    let mut rdr = csv_reader(path)?;
    let pb = load_spinner("Loading track metadata");

    let mut tracks = HashMap::new();
    for result in rdr.deserialize() {
        let record: TrackRecord = result?;
        tracks.insert(
            record.track_uri,
            TrackInfo {
                title: record.track_name,
                artist: record.artist_name,
            },
        );
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("Loaded {} tracks from {}", tracks.len(), path.display());
    Ok(tracks)
}

fn read_items(
    path: &Path,
    tracks: &HashMap<String, TrackInfo>,
) -> Result<HashMap<String, Vec<TrackInfo>>> {
    let mut rdr = csv_reader(path)?;
    let pb = load_spinner("Loading playlist items");

    let mut playlist_tracks: HashMap<String, Vec<TrackInfo>> = HashMap::new();
    let mut row_count = 0usize;
    let mut unresolved = 0usize;
    for result in rdr.deserialize() {
        let record: ItemRecord = result?;
        row_count += 1;

        // The playlist keeps its entry even when every reference is dropped.
        let entry = playlist_tracks.entry(record.pid).or_default();
        match tracks.get(&record.track_uri) {
            Some(info) => entry.push(info.clone()),
            None => unresolved += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "Loaded {} playlists from {} ({} membership rows, {} unresolved track refs dropped)",
        playlist_tracks.len(),
        path.display(),
        row_count,
        unresolved
    );
    Ok(playlist_tracks)
}

fn csv_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| {
        ApiError::CatalogError(format!("cannot open {}: {}", path.display(), e))
    })?;
    Ok(ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn load_spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}: {pos} rows"));
    pb.set_message(label.to_string());
    pb.enable_steady_tick(120);
    pb
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn load_fixture_catalog(dir: &TempDir) -> Catalog {
        let tracks = write_file(
            dir,
            "tracks.csv",
            "track_uri,track_name,artist_name\n\
             spotify:track:a,Song A,Artist A\n\
             spotify:track:b,Song B,Artist B\n",
        );
        let items = write_file(
            dir,
            "items.csv",
            "pid,track_uri\n\
             42,spotify:track:a\n\
             42,spotify:track:b\n\
             42,spotify:track:a\n\
             42,spotify:track:ghost\n\
             9,spotify:track:ghost\n",
        );
        let playlists = write_file(
            dir,
            "playlists.csv",
            "pid,name\n42,roadtrip jams\n9,misc\n",
        );
        Catalog::load(&tracks, &items, &playlists).unwrap()
    }

    #[test]
    fn resolves_membership_rows_in_file_order_with_duplicates() {
        let dir = TempDir::new().unwrap();
        let catalog = load_fixture_catalog(&dir);

        let tracks = catalog.playlist_tracks("42").unwrap();
        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Song A", "Song B", "Song A"]);
    }

    #[test]
    fn unresolvable_references_are_dropped_silently() {
        let dir = TempDir::new().unwrap();
        let catalog = load_fixture_catalog(&dir);

        // "42" had four membership rows; the ghost reference is gone.
        assert_eq!(catalog.playlist_tracks("42").unwrap().len(), 3);
        // "9" referenced only the ghost track but keeps its empty entry.
        assert_eq!(catalog.playlist_tracks("9").unwrap(), &[] as &[TrackInfo]);
    }

    #[test]
    fn playlist_titles_and_lookups() {
        let dir = TempDir::new().unwrap();
        let catalog = load_fixture_catalog(&dir);

        assert_eq!(catalog.playlist_title("42"), Some("roadtrip jams"));
        assert_eq!(catalog.playlist_title("404"), None);
        assert_eq!(catalog.track("spotify:track:b").unwrap().artist, "Artist B");
        assert!(catalog.playlist_tracks("404").is_none());
        assert_eq!(catalog.track_count(), 2);
        assert_eq!(catalog.playlist_count(), 2);
    }

    #[test]
    fn pid_values_are_trimmed() {
        let dir = TempDir::new().unwrap();
        let tracks = write_file(
            &dir,
            "tracks.csv",
            "track_uri,track_name,artist_name\nspotify:track:a,Song A,Artist A\n",
        );
        let items = write_file(&dir, "items.csv", "pid,track_uri\n 42 ,spotify:track:a\n");
        let playlists = write_file(&dir, "playlists.csv", "pid,name\n 42 ,roadtrip jams\n");
        let catalog = Catalog::load(&tracks, &items, &playlists).unwrap();

        assert!(catalog.playlist_tracks("42").is_some());
        assert_eq!(catalog.playlist_title("42"), Some("roadtrip jams"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.csv");
        let err = read_playlists(&missing).unwrap_err();
        assert!(matches!(err, ApiError::CatalogError(_)));
    }

    #[test]
    fn ordered_playlist_read_preserves_file_order() {
        let dir = TempDir::new().unwrap();
        let playlists = write_file(
            &dir,
            "playlists.csv",
            "pid,name\n3,first\n1,second\n2,third\n",
        );
        let rows = read_playlists(&playlists).unwrap();
        let pids: Vec<&str> = rows.iter().map(|(pid, _)| pid.as_str()).collect();
        assert_eq!(pids, vec!["3", "1", "2"]);
    }
}
