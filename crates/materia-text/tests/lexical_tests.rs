use std::fs;
use std::path::Path;

use tempfile::TempDir;

use materia_core::corpus::CorpusLoader;
use materia_core::error::Error;
use materia_core::normalize::Normalizer;
use materia_core::traits::MaterialSearch;
use materia_core::types::{Category, CategoryFilter, SearchRequest};
use materia_text::{LexicalEngine, TfidfVectorizer, VECTORIZER_FILE};

fn tokens(s: &str) -> Vec<String> { s.split_whitespace().map(str::to_string).collect() }

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("quotes.json"),
        r#"[
            {"content": "Knowledge is power", "keywords": ["learning"], "source": "Francis Bacon"},
            {"content": "Time waits for no one", "keywords": ["time"]}
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.join("examples.json"),
        r#"[{"content": "She kept learning every evening after work", "keywords": ["learning", "habit"], "theme": "growth"}]"#,
    )
    .unwrap();
    fs::write(
        dir.join("poems.json"),
        r#"[{"content": "Spring rain falls quietly at night", "keywords": ["nature"]}]"#,
    )
    .unwrap();
}

fn loader(dir: &Path) -> CorpusLoader { CorpusLoader::new(dir).with_normalizer(Normalizer::whitespace()) }

#[test]
fn fit_uses_smoothed_idf_over_unigrams_and_bigrams() {
    let mut v = TfidfVectorizer::new(0.0);
    v.fit(&[tokens("apple banana"), tokens("apple")]);
    assert_eq!(v.vocabulary_len(), 3);
    assert!(v.contains("apple") && v.contains("banana") && v.contains("apple banana"));

    let single = v.transform(&tokens("apple"));
    assert_eq!(single.entries().len(), 1);
    assert!((single.entries()[0].1 - 1.0).abs() < 1e-6);

    // apple idf = 1, banana idf = ln(3/2) + 1
    let pair = v.transform(&tokens("apple banana"));
    assert_eq!(pair.entries().len(), 3);
    let banana_idf = (1.5f32).ln() + 1.0;
    let norm = (1.0 + 2.0 * banana_idf * banana_idf).sqrt();
    let apple_weight = pair.entries()[0].1;
    assert!((apple_weight - 1.0 / norm).abs() < 1e-5);
    assert!(v.transform(&tokens("cherry")).is_empty());
}

#[test]
fn min_df_drops_rare_terms() {
    let mut v = TfidfVectorizer::new(0.6);
    v.fit(&[tokens("apple banana"), tokens("apple cherry")]);
    assert_eq!(v.vocabulary_len(), 1);
    assert!(v.contains("apple"));
}

#[test]
fn ranks_by_similarity_and_rounds_scores() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let engine = LexicalEngine::open(&loader(&tmp.path().join("data")), tmp.path(), 0.01).unwrap();
    assert_eq!(engine.len(), 4);

    let results = engine.try_search("learning habit", 4, CategoryFilter::All).unwrap();
    assert_eq!(results.len(), 4, "no threshold, always top_k rows");
    assert_eq!(results[0].category, Category::Examples);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    for r in &results {
        let scaled = r.score * 1000.0;
        assert!((scaled - scaled.round()).abs() < 1e-2, "score {} not rounded", r.score);
    }
    assert_eq!(results[3].score, 0.0);
}

#[test]
fn category_filter_applies_after_selection() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let engine = LexicalEngine::open(&loader(&tmp.path().join("data")), tmp.path(), 0.01).unwrap();

    // best row is the example; quotes outside the top 1 are not reached
    let quotes = engine.try_search("learning habit", 1, CategoryFilter::Only(Category::Quotes)).unwrap();
    assert!(quotes.is_empty());
    let quotes = engine.try_search("learning habit", 2, CategoryFilter::Only(Category::Quotes)).unwrap();
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].content, "Knowledge is power");
    assert_eq!(quotes[0].source.as_deref(), Some("Francis Bacon"));
}

#[test]
fn trait_surface_ignores_threshold() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    let engine = LexicalEngine::open(&loader(&tmp.path().join("data")), tmp.path(), 0.01).unwrap();
    let search: &dyn MaterialSearch = &engine;
    let results = search.search("spring rain", &SearchRequest::new(2).threshold(0.99));
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].category, Category::Poems);
    assert!(results[1].score < 0.99);
    assert!(search.search("spring rain", &SearchRequest::new(0)).is_empty());
}

#[test]
fn fitted_vectorizer_is_reused() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    write_corpus(&data);
    let first = LexicalEngine::open(&loader(&data), tmp.path(), 0.01).unwrap();
    assert!(tmp.path().join(VECTORIZER_FILE).exists());

    fs::write(data.join("poems.json"), r#"[{"content": "Brand new verse about mountains", "keywords": []}]"#).unwrap();
    let second = LexicalEngine::open(&loader(&data), tmp.path(), 0.01).unwrap();
    assert_eq!(first.vectorizer(), second.vectorizer());
    assert!(!second.vectorizer().contains("mountains"));
}

#[test]
fn empty_corpus_answers_with_nothing() {
    let tmp = TempDir::new().unwrap();
    let engine = LexicalEngine::open(&loader(&tmp.path().join("missing")), tmp.path(), 0.01).unwrap();
    assert!(engine.is_empty());
    assert!(!tmp.path().join(VECTORIZER_FILE).exists());
    assert!(engine.try_search("anything", 5, CategoryFilter::All).unwrap().is_empty());
}

#[test]
fn unreadable_vectorizer_is_a_configuration_error() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("data"));
    fs::write(tmp.path().join(VECTORIZER_FILE), b"{not json").unwrap();
    let err = LexicalEngine::open(&loader(&tmp.path().join("data")), tmp.path(), 0.01).err().expect("fails");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Configuration(_))));
}
