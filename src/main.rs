//! Relevance judge entrypoint: scores the built-in query/document pairs.

use mimalloc::MiMalloc;

use judge::config::Config;
use judge::pipeline::{JudgeSession, QueryDocumentPair};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const BACKEND_EXPERIENCE: &str = "Занимался разработкой новых и оптимизацией существующих backend-сервисов для корпоративной системы, обеспечивал интеграцию со сторонними провайдерами данных.¶¶Участвовал в проектировании и разработке сервисов для обновления и миграции устаревших подсистем.¶¶Стек: .NET 6 - 8, EF, MSSQL, PostgreSQL, Swagger";

const TRAFFIC_MANAGER_EXPERIENCE: &str = "- Руководство группой менеджеров: распределение ресурсов, контроль качества исполняемой работы, менторинг;¶- Выполнение KPI рекламных кампаний;¶- Взаимодействие с аккаунт-менеджерами, backend и frontend отделами, дизайнерами, отделом баинга, консультация аккаунт-менеджеров;¶- Собеседование кандидатов на должность трафик-менеджера;¶- Проведение performance review;¶- Запуск и ведение рекламных кампаний (Senior Traffic Manager);¶- Оптимизация рекламных кампаний по различным верификаторам;¶- Аналитика в Яндекс.Метрика, Google Analytics;¶- Создание отчетов и посткампейн-исследований.¶";

fn sample_pairs() -> Vec<QueryDocumentPair> {
    vec![
        QueryDocumentPair::new("What is the capital of China?", "A CAT LIKE MILK"),
        QueryDocumentPair::new(
            "Explain gravity",
            "Gravity is a force that attracts two bodies towards each other. It gives weight to physical objects and is responsible for the movement of planets around the sun.",
        ),
        QueryDocumentPair::new("C# Backend developer", BACKEND_EXPERIENCE),
        QueryDocumentPair::new("C# Backend developer", TRAFFIC_MANAGER_EXPERIENCE),
        QueryDocumentPair::new("Unity developer", BACKEND_EXPERIENCE),
    ]
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!(
        model_path = %config.model_path.display(),
        tokenizer_path = %config.tokenizer_path().display(),
        max_new_tokens = config.max_new_tokens,
        "Relevance judge starting"
    );

    let mut session = JudgeSession::open(&config)?;
    let pairs = sample_pairs();

    println!("=== BATCH PROCESSING MULTIPLE PAIRS ===\n");
    let report = session.orchestrator().run(&pairs);

    for (position, pair) in pairs.iter().enumerate() {
        println!("{}", report.pair_block(position, pair));
    }
    print!("{}", report.summary());

    if std::env::args().any(|arg| arg == "--json") {
        println!("{}", report.to_json()?);
    }

    Ok(())
}
