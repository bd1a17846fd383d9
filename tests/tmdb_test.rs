//! TMDB API client tests
//!
//! Tests item details, id resolution, season data and error handling.

use mockito::{Matcher, Server};
use reelcast::api::tmdb::TmdbError;
use reelcast::api::{MetadataProvider, TmdbClient};
use reelcast::models::MediaKind;

fn client(url: String) -> TmdbClient {
    TmdbClient::with_base_url(Some("test_key".to_string()), url)
}

const MATRIX_DETAIL: &str = r#"{
    "id": 603,
    "title": "The Matrix",
    "release_date": "1999-03-30",
    "runtime": 136,
    "genres": [{"id": 28, "name": "Action"}, {"id": 878, "name": "Science Fiction"}],
    "overview": "Set in the 22nd century, The Matrix tells the story of a computer hacker.",
    "vote_average": 8.2,
    "imdb_id": "tt0133093",
    "external_ids": {"imdb_id": "tt0133093"},
    "videos": {"results": [{"key": "vKQi3bBA1y8", "site": "YouTube", "type": "Trailer"}]}
}"#;

const BREAKING_BAD_DETAIL: &str = r#"{
    "id": 1396,
    "name": "Breaking Bad",
    "first_air_date": "2008-01-20",
    "episode_run_time": [45, 47],
    "genres": [{"id": 18, "name": "Drama"}],
    "overview": "Walter White turns to cooking meth after a cancer diagnosis.",
    "vote_average": 8.9,
    "seasons": [
        {"season_number": 0, "episode_count": 9, "name": "Specials"},
        {"season_number": 1, "episode_count": 7, "name": "Season 1"},
        {"season_number": 2, "episode_count": 13, "name": "Season 2"}
    ],
    "external_ids": {"imdb_id": "tt0903747"}
}"#;

// =============================================================================
// Item Tests
// =============================================================================

#[tokio::test]
async fn test_movie_item_parses_details() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/movie/603")
        .match_query(Matcher::UrlEncoded(
            "append_to_response".into(),
            "external_ids,videos".into(),
        ))
        .match_header("authorization", "Bearer test_key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(MATRIX_DETAIL)
        .create_async()
        .await;

    let item = client(server.url())
        .get_item("603", MediaKind::Movie)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(item.id, "603");
    assert_eq!(item.title, "The Matrix");
    assert_eq!(item.kind, MediaKind::Movie);
    assert_eq!(item.year, Some(1999));
    assert_eq!(item.ids.imdb_id, "tt0133093");
    assert_eq!(item.ids.tmdb_id, "603");
    assert_eq!(item.runtime, Some(136));
    assert_eq!(item.genres, vec!["Action", "Science Fiction"]);
    assert_eq!(
        item.trailer.as_deref(),
        Some("https://www.youtube.com/watch?v=vKQi3bBA1y8")
    );
}

#[tokio::test]
async fn test_show_item_uses_name_and_episode_runtime() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/tv/1396")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(BREAKING_BAD_DETAIL)
        .create_async()
        .await;

    let item = client(server.url())
        .item("1396", MediaKind::Show)
        .await
        .unwrap();

    assert_eq!(item.title, "Breaking Bad");
    assert_eq!(item.kind, MediaKind::Show);
    assert_eq!(item.year, Some(2008));
    assert_eq!(item.runtime, Some(45));
    assert_eq!(item.ids.imdb_id, "tt0903747");
    assert!(item.trailer.is_none());
}

#[tokio::test]
async fn test_imdb_id_is_resolved_through_find() {
    let mut server = Server::new_async().await;
    let find = server
        .mock("GET", "/find/tt0133093")
        .match_query(Matcher::UrlEncoded(
            "external_source".into(),
            "imdb_id".into(),
        ))
        .with_status(200)
        .with_body(r#"{"movie_results": [{"id": 603}], "tv_results": []}"#)
        .create_async()
        .await;
    let detail = server
        .mock("GET", "/movie/603")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(MATRIX_DETAIL)
        .create_async()
        .await;

    let item = client(server.url())
        .item("tt0133093", MediaKind::Movie)
        .await
        .unwrap();

    find.assert_async().await;
    detail.assert_async().await;
    assert_eq!(item.id, "603");
}

#[tokio::test]
async fn test_unknown_imdb_id_is_not_found() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/find/tt9999999")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"movie_results": [], "tv_results": []}"#)
        .create_async()
        .await;

    let err = client(server.url())
        .item("tt9999999", MediaKind::Show)
        .await
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<TmdbError>(), Some(TmdbError::NotFound)));
}

// =============================================================================
// Season Tests
// =============================================================================

#[tokio::test]
async fn test_season_list_excludes_specials() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/tv/1396")
        .with_status(200)
        .with_body(BREAKING_BAD_DETAIL)
        .create_async()
        .await;

    let seasons = client(server.url())
        .get_season_list("1396")
        .await
        .unwrap();

    assert_eq!(seasons.len(), 2);
    assert_eq!(seasons[0].number, 1);
    assert_eq!(seasons[0].episode_count, 7);
    assert_eq!(seasons[1].name.as_deref(), Some("Season 2"));
}

#[tokio::test]
async fn test_season_episodes() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/tv/1396/season/2")
        .with_status(200)
        .with_body(
            r#"{"episodes": [
                {"episode_number": 1, "name": "Seven Thirty-Seven", "overview": "Walt and Jesse"},
                {"episode_number": 2, "name": "Grilled", "overview": null}
            ]}"#,
        )
        .create_async()
        .await;

    let episodes = client(server.url())
        .get_season_episodes("1396", 2)
        .await
        .unwrap();

    assert_eq!(episodes.len(), 2);
    assert_eq!(episodes[0].season, 2);
    assert_eq!(episodes[1].episode, 2);
    assert_eq!(episodes[1].to_string(), "S02E02 - Grilled");
    assert_eq!(episodes[1].overview, "");
}

// =============================================================================
// Error Tests
// =============================================================================

#[tokio::test]
async fn test_not_found() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie/0")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"status_code": 34}"#)
        .create_async()
        .await;

    let err = client(server.url())
        .item("0", MediaKind::Movie)
        .await
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<TmdbError>(), Some(TmdbError::NotFound)));
}

#[tokio::test]
async fn test_rate_limit_retries_then_gives_up() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/movie/603")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("Retry-After", "0")
        .expect(3)
        .create_async()
        .await;

    let err = client(server.url())
        .item("603", MediaKind::Movie)
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err.downcast_ref::<TmdbError>(), Some(TmdbError::RateLimited)));
}

#[tokio::test]
async fn test_rate_limit_recovers_after_retry() {
    let mut server = Server::new_async().await;

    // First request returns 429, second succeeds
    let mock_429 = server
        .mock("GET", "/tv/1396/season/1")
        .with_status(429)
        .with_header("Retry-After", "0")
        .expect(1)
        .create_async()
        .await;
    let mock_200 = server
        .mock("GET", "/tv/1396/season/1")
        .with_status(200)
        .with_body(r#"{"episodes": []}"#)
        .expect(1)
        .create_async()
        .await;

    let episodes = client(server.url()).episodes("1396", 1).await.unwrap();

    assert!(episodes.is_empty());
    mock_429.assert_async().await;
    mock_200.assert_async().await;
}

#[tokio::test]
async fn test_server_error_and_bad_json() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie/1")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;
    let _mock = server
        .mock("GET", "/movie/2")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;
    let tmdb = client(server.url());

    let err = tmdb.item("1", MediaKind::Movie).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TmdbError>(),
        Some(TmdbError::ServerError(503))
    ));

    let err = tmdb.item("2", MediaKind::Movie).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TmdbError>(),
        Some(TmdbError::InvalidResponse(_))
    ));
}
