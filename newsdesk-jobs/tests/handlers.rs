//! Handler tests driven through a real worker on the in-memory broker.

use newsdesk_generation::{GenerationError, ScriptedGenerator};
use newsdesk_jobs::*;
use newsdesk_queue::*;
use newsdesk_store::{Article, MemoryUserStore, StoredEmbedding, UserRecord};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    broker: Arc<dyn Broker>,
    store: MemoryUserStore,
    generator: Arc<ScriptedGenerator>,
    newsletter_model: Option<&'static str>,
}

impl Harness {
    fn new(generator: ScriptedGenerator) -> Self {
        Self {
            broker: Arc::new(MemoryBroker::new()),
            store: MemoryUserStore::new(),
            generator: Arc::new(generator),
            newsletter_model: None,
        }
    }

    fn context(&self) -> JobContext {
        let context = JobContext::new(Arc::new(self.store.clone()), self.generator.clone())
            .with_task_step_delay(Duration::from_millis(5));
        match self.newsletter_model {
            Some(model) => context.with_newsletter_model(model),
            None => context,
        }
    }

    async fn run<P: JobPayload>(&self, payload: &P) -> Job {
        let queue_name = queue_for::<P>().unwrap();
        let queue = Queue::named(queue_name, self.broker.clone());
        let config = WorkerConfig::default().with_poll_interval(Duration::from_millis(5));
        let mut worker = worker_for(queue_name, self.broker.clone(), &self.context(), config);
        worker.start().await.unwrap();

        let id = queue.enqueue(payload).await.unwrap();
        let job = loop {
            let job = queue.get_job(id).await.unwrap().unwrap();
            if job.state.is_terminal() {
                break job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        worker.stop().await.unwrap();
        job
    }
}

fn articles(n: usize) -> Vec<Article> {
    (1..=n)
        .map(|i| {
            Article::new(
                format!("Story {i}"),
                "The Wire",
                format!("Body of story {i}"),
                format!("https://example.com/{i}"),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_task_handler_echoes_data() {
    let harness = Harness::new(ScriptedGenerator::new());
    let job = harness.run(&TaskPayload::new(json!({"hello": "world"}))).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.progress, 100);
    let result = job.result.unwrap();
    assert_eq!(result["processed"], true);
    assert_eq!(result["originalData"], json!({"hello": "world"}));
    assert_eq!(result["message"], "Task completed successfully");
    assert!(result["processedAt"].is_string());
}

#[tokio::test]
async fn test_newsletter_uses_payload_prompt_and_format_directive() {
    let harness = Harness::new(ScriptedGenerator::new());
    harness.store.insert(
        UserRecord::new("ann")
            .with_prompt("stored prompt")
            .with_format_directive("Return JSON with headline")
            .with_articles(articles(2)),
    );

    let payload = NewsletterPayload::new("ann", "Focus on Rust", None).unwrap();
    let job = harness.run(&payload).await;

    assert_eq!(job.state, JobState::Completed);
    let requests = harness.generator.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.model == "gpt-4o-mini"));
    assert!(requests[0].prompt.starts_with("Focus on Rust"));
    assert!(requests[0].prompt.ends_with("Return JSON with headline"));
    assert!(requests[1].prompt.contains("Story 2"));
}

#[tokio::test]
async fn test_newsletter_falls_back_to_stored_prompt() {
    let harness = Harness::new(ScriptedGenerator::new());
    harness
        .store
        .insert(UserRecord::new("ann").with_prompt("stored prompt").with_articles(articles(1)));

    let payload = NewsletterPayload::new("ann", "", Some("gpt-4o".into())).unwrap();
    harness.run(&payload).await;

    let requests = harness.generator.requests();
    assert!(requests[0].prompt.starts_with("stored prompt"));
    assert_eq!(requests[0].model, "gpt-4o");
}

#[tokio::test]
async fn test_newsletter_model_override_applies_when_payload_has_none() {
    let mut harness = Harness::new(ScriptedGenerator::new());
    harness.newsletter_model = Some("gpt-4.1");
    harness.store.insert(UserRecord::new("ann").with_articles(articles(1)));

    harness.run(&NewsletterPayload::new("ann", "p", None).unwrap()).await;
    harness.run(&NewsletterPayload::new("ann", "p", Some("gpt-4o".into())).unwrap()).await;

    let models: Vec<_> = harness.generator.requests().into_iter().map(|r| r.model).collect();
    assert_eq!(models, vec!["gpt-4.1", "gpt-4o"]);
}

#[tokio::test]
async fn test_newsletter_write_failure_fails_job() {
    let harness = Harness::new(ScriptedGenerator::new());
    harness.store.insert(UserRecord::new("ann").with_articles(articles(1)));
    harness.store.reject_writes(true);

    let job = harness.run(&NewsletterPayload::new("ann", "p", None).unwrap()).await;

    assert_eq!(job.state, JobState::Failed);
    assert!(job.failed_reason.unwrap().contains("Write rejected"));
}

#[tokio::test]
async fn test_newsletter_skips_item_that_is_not_an_object() {
    let generator = ScriptedGenerator::new().on_generate(|request| {
        if request.prompt.contains("Story 2") {
            Ok(json!("just some text"))
        } else {
            Ok(json!({"headline": "ok"}))
        }
    });
    let harness = Harness::new(generator);
    harness.store.insert(UserRecord::new("ann").with_articles(articles(3)));

    let job = harness.run(&NewsletterPayload::new("ann", "p", None).unwrap()).await;

    assert_eq!(job.state, JobState::Completed);
    let result = job.result.unwrap();
    assert_eq!(result["count"], 2);
    let newsletter = harness.store.get("ann").unwrap().newsletter.unwrap();
    let titles: Vec<_> = newsletter
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Story 1", "Story 3"]);
    assert_eq!(harness.store.write_count(), 1);
}

#[tokio::test]
async fn test_embedding_handler_isolates_failures() {
    let generator = ScriptedGenerator::new().on_embed(|input| {
        if input.contains("Story 2") {
            Err(GenerationError::Api {
                status: 400,
                message: "too long".into(),
            })
        } else {
            Ok(vec![1.0, 0.5])
        }
    });
    let harness = Harness::new(generator);
    harness.store.insert(UserRecord::new("ann").with_articles(articles(3)));

    let job = harness.run(&UserJobPayload::new("ann").unwrap()).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, Some(json!({"username": "ann", "count": 2})));
    let saved = harness.store.get("ann").unwrap();
    let links: Vec<_> = saved.embeddings.iter().map(|e| e.link.as_str()).collect();
    assert_eq!(links, vec!["https://example.com/1", "https://example.com/3"]);
    assert_eq!(harness.store.write_count(), 1);
}

#[tokio::test]
async fn test_similarity_search_ranks_stored_embeddings() {
    let harness = Harness::new(ScriptedGenerator::new().on_embed(|_| Ok(vec![1.0, 0.0])));
    let stored = |title: &str, vector: Vec<f32>| StoredEmbedding {
        link: format!("https://example.com/{title}"),
        title: title.to_string(),
        source: "Wire".to_string(),
        vector,
    };
    harness.store.insert(UserRecord::new("ann").with_embeddings(vec![
        stored("orthogonal", vec![0.0, 1.0]),
        stored("exact", vec![2.0, 0.0]),
        stored("diagonal", vec![1.0, 1.0]),
    ]));

    let payload = SimilaritySearchPayload::new("ann", Some("rust".into()), Some(2)).unwrap();
    let job = harness.run(&payload).await;

    assert_eq!(job.state, JobState::Completed);
    let result = job.result.unwrap();
    let titles: Vec<&str> = result["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|hit| hit["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["exact", "diagonal"]);
    assert_eq!(harness.generator.embed_inputs(), vec!["rust".to_string()]);
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_similarity_search_without_embeddings_fails() {
    let harness = Harness::new(ScriptedGenerator::new());
    harness.store.insert(UserRecord::new("ann").with_prompt("rust"));

    let job = harness
        .run(&SimilaritySearchPayload::new("ann", None, None).unwrap())
        .await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(
        job.failed_reason.as_deref(),
        Some("No embeddings stored for user: ann")
    );
}

#[tokio::test]
async fn test_malformed_payload_fails_job() {
    let harness = Harness::new(ScriptedGenerator::new());
    let queue = Queue::named(QueueName::Newsletter, harness.broker.clone());
    let mut worker = worker_for(
        QueueName::Newsletter,
        harness.broker.clone(),
        &harness.context(),
        WorkerConfig::default().with_poll_interval(Duration::from_millis(5)),
    );
    worker.start().await.unwrap();

    let id = queue
        .add("generate-newsletter", Value::String("not an object".into()))
        .await
        .unwrap();
    let job = loop {
        let job = queue.get_job(id).await.unwrap().unwrap();
        if job.state.is_terminal() {
            break job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    worker.stop().await.unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert!(job.failed_reason.unwrap().contains("payload"));
}
