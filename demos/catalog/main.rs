//! Product catalog walkthrough
//!
//! This example demonstrates:
//! - Loading repository settings from YAML
//! - Standing, keyed and one-shot criteria
//! - Mapping request parameters onto a paginated query
//! - An extended repository with scopes and the active flag
//! - A transactional service pipeline that rolls back on failure

use anyhow::Context;
use repo::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Product {
    #[serde(default)]
    id: i64,
    name: String,
    category: String,
    price: f64,
    #[serde(default)]
    stock: i64,
    #[serde(default)]
    active: bool,
}

impl Model for Product {
    fn describe() -> ModelDescriptor {
        ModelDescriptor::new("products")
            .relation(RelationDef::has_many("reviews", "reviews", "product_id", "id"))
            .scope("category", |query, params| {
                let category = params.first().cloned().unwrap_or(Value::Null);
                Ok(query.where_eq("category", category))
            })
    }
}

fn row(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn seed(store: &InMemoryStore) -> RepoResult<()> {
    let catalog = [
        ("Oak Desk", "furniture", 240.0, 4, true),
        ("Pine Shelf", "furniture", 80.0, 12, true),
        ("Desk Lamp", "lighting", 35.0, 30, true),
        ("Floor Lamp", "lighting", 95.0, 0, false),
        ("Office Chair", "furniture", 150.0, 7, true),
        ("LED Strip", "lighting", 20.0, 50, true),
        ("Bookcase", "furniture", 180.0, 3, true),
    ];
    let rows = catalog
        .iter()
        .map(|(name, category, price, stock, active)| {
            row(json!({
                "name": name,
                "category": category,
                "price": price,
                "stock": stock,
                "active": active,
            }))
        })
        .collect();
    store.seed("products", "id", rows)?;

    store.seed(
        "reviews",
        "id",
        vec![
            row(json!({"product_id": 1, "rating": 5})),
            row(json!({"product_id": 5, "rating": 4})),
            row(json!({"product_id": 5, "rating": 2})),
        ],
    )?;
    Ok(())
}

// === Pipeline ===

struct Restock {
    store: Arc<InMemoryStore>,
}

#[async_trait]
impl Stage for Restock {
    async fn handle(&self, mut data: ServiceData) -> anyhow::Result<ServiceData> {
        let amount = data
            .input_value("amount")
            .and_then(Value::as_i64)
            .context("amount is required")?;
        let category = data
            .input_value("category")
            .cloned()
            .context("category is required")?;

        let mut products =
            Repository::<Product>::new(self.store.clone(), RepositoryConfig::default())?;
        products.push_criteria(FieldIsValue::new("category", category), Some("category"));
        let touched = products.increment("stock", amount as f64).await?;
        data.set("restocked", touched);
        Ok(data)
    }
}

struct Audit;

#[async_trait]
impl Stage for Audit {
    async fn handle(&self, data: ServiceData) -> anyhow::Result<ServiceData> {
        let restocked: u64 = data.get_as("restocked")?.unwrap_or(0);
        if restocked > 3 {
            anyhow::bail!("refusing to restock {} products at once", restocked);
        }
        Ok(data)
    }
}

struct RestockCategory;

impl Service for RestockCategory {
    fn name(&self) -> &str {
        "restock_category"
    }

    fn services(&self) -> &[&str] {
        &["restock"]
    }

    fn end(&self) -> &[&str] {
        &["audit"]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("📦 Repo Criteria Catalog Example");
    println!("================================\n");

    let config = RepositoryConfig::from_yaml_str(include_str!("catalog.yaml"))?;
    println!("✅ Loaded configuration (page size {:?})\n", config.pagination.limit);

    let store = Arc::new(InMemoryStore::new());
    seed(&store)?;

    // Standing and one-shot criteria
    let mut products = Repository::<Product>::new(store.clone(), config.clone())?;
    products.push_criteria(IsActive::new("active"), Some(CriteriaKey::Active.as_str()));
    products.push_once_criteria(OrderBy::desc("price"), Some(CriteriaKey::Order.as_str()));

    let priciest = products.first(&["*"]).await?.context("catalog is empty")?;
    println!("💰 Most expensive active product: {} ({})", priciest.name, priciest.price);
    println!("🔢 Active products: {}", products.count().await?);

    products.push_once_criteria(Has::new("reviews").count(Operator::Ge, 2), None);
    for product in products.all(&["*"]).await? {
        println!("⭐ Reviewed at least twice: {}", product.name);
    }

    // Request mapping
    let params = RequestParams::from_pairs([
        ("name", "desk"),
        ("sort_price", "asc"),
        ("page", "1"),
    ]);
    let mut request = RequestCriteria::from_params(params, &config);
    request.column("name").search(SearchOperator::Like);
    request.column("price").sort_by_desc();
    let request = Arc::new(request);

    products.push_once_criteria(request.clone(), None);
    println!("\n🔎 Search for 'desk':");
    for product in products.all(&["*"]).await? {
        println!("   - {} at {}", product.name, product.price);
    }
    println!("📄 Pagination: {}", request.paginate_json());

    let page = products.paginate(None, &["*"], Some(2)).await?;
    println!(
        "📄 Page {}/{} holds {} products",
        page.pagination.page,
        page.pagination.total_pages,
        page.data.len()
    );

    // Extended repository
    let mut extended = ExtendedRepository::<Product>::new(
        store.clone(),
        config.clone(),
        ExtendedSettings::default(),
    )?;
    extended.add_scope("category", vec![json!("lighting")])?;
    println!("\n💡 Active lighting products: {}", extended.count().await?);
    extended.activate_record(4, true).await?;
    println!("💡 After activating the floor lamp: {}", extended.count().await?);

    // Pipelines
    let mut registry = StageRegistry::new();
    let restock_store = store.clone();
    registry.register("restock", move || Restock {
        store: restock_store.clone(),
    });
    registry.register("audit", || Audit);
    let runner = ServiceRunner::new(registry, store.clone());

    let mut input = Input::new();
    input.insert("category".to_string(), json!("lighting"));
    input.insert("amount".to_string(), json!(10));
    let data = runner.run(&RestockCategory, input).await?;
    println!(
        "\n🚚 Restocked {} lighting products",
        data.get("restocked").cloned().unwrap_or_default()
    );

    let mut input = Input::new();
    input.insert("category".to_string(), json!("furniture"));
    input.insert("amount".to_string(), json!(10));
    if let Err(e) = runner.run(&RestockCategory, input).await {
        println!("🛑 Furniture restock rolled back: {}", e);
    }

    let stock: Vec<Value> = store
        .rows("products")?
        .into_iter()
        .map(|row| json!({"name": row["name"], "stock": row["stock"]}))
        .collect();
    println!("\n📊 Final stock: {}", serde_json::to_string_pretty(&stock)?);

    Ok(())
}
