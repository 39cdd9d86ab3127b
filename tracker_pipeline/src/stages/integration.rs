use dagger_sdk::{Directory, Query};

use crate::containers;

/// Boot the release binary against a fresh PostgreSQL database and walk the
/// HTTP surface: login, upload, collection, reports, re-import and the
/// admin panel's account rules.
pub async fn run(client: &Query, source: Directory) -> eyre::Result<String> {
    let pg = containers::postgres(client);
    let db_url = "postgres://tracker:tracker_password@db:5432/tracker_test";

    let test_script = r#"
set -euo pipefail

BINARY="certificate-tracker"
BASE="http://127.0.0.1:8000"
ADMIN_JAR=$(mktemp)
CLERK_JAR=$(mktemp)
WORK=$(mktemp -d)

# status <jar> <curl args...>: print the HTTP status, body to $WORK/body
status() {
    local jar=$1; shift
    curl -s -o "$WORK/body" -w '%{http_code}' -b "$jar" -c "$jar" "$@"
}
expect() {
    echo "$1 -> $2"
    if [ "$2" != "$3" ]; then
        echo "expected $3"; cat "$WORK/body"; echo; exit 1
    fi
}
body_has() {
    grep -q -- "$1" "$WORK/body" || { echo "missing $1 in:"; cat "$WORK/body"; echo; exit 1; }
}
first_id() {
    grep -o '"id":[0-9]*' "$WORK/body" | head -1 | cut -d: -f2
}

echo "=== Integration Test: Certificate Tracker ==="

echo "[1/9] Running migrations..."
$BINARY migrate

echo "[2/9] Creating superuser..."
$BINARY create-superuser --username registrar --email registrar@example.edu

echo "[3/9] Verifying schema..."
TABLES=$(psql "$DATABASE_URL" -t -c "SELECT COUNT(*) FROM information_schema.tables WHERE table_name IN ('tracker_users', 'certificate_records', 'activity_logs', 'dashboard_stats')" | tr -d ' ')
test "$TABLES" = "4"

echo "[4/9] Starting server..."
$BINARY serve --port 8000 --workers 2 &
SERVER_PID=$!
for i in $(seq 1 30); do curl -sf "$BASE/health" >/dev/null && break; sleep 1; done
curl -sf "$BASE/health"
echo

echo "[5/9] Logging in..."
expect "bad login" "$(status "$ADMIN_JAR" -X POST -H 'content-type: application/json' \
    -d '{"username":"registrar","password":"wrong"}' "$BASE/login/")" 401
expect "good login" "$(status "$ADMIN_JAR" -X POST -H 'content-type: application/json' \
    -d "{\"username\":\"registrar\",\"password\":\"$SUPERUSER_PASSWORD\"}" "$BASE/login/")" 200
ADMIN_ID=$(first_id)

echo "[6/9] Reports on an empty registry..."
expect "collected report, nothing collected" \
    "$(status "$ADMIN_JAR" "$BASE/registry/generate_report/?status=Collected")" 404
body_has '"No Collected certificates found."'
expect "report without a type" "$(status "$ADMIN_JAR" "$BASE/registry/generate_report/")" 400

echo "[7/9] Upload and collection..."
printf 'Name,Index Number,Programme,Department\nAma Mensah,UEW-1001,BEd Maths,Mathematics\nKofi Boateng,UEW-1002,BSc IT,Computing\nEsi Owusu,nan,BA English,Languages\n' > "$WORK/graduates.csv"
expect "upload" "$(status "$ADMIN_JAR" -F "excel_file=@$WORK/graduates.csv" "$BASE/registry/upload/")" 200
body_has '"created":2'
body_has '"skipped":1'

expect "search" "$(status "$ADMIN_JAR" "$BASE/registry/upload/?q=UEW-1001")" 200
PK=$(first_id)
expect "collect missing" "$(status "$ADMIN_JAR" -X POST "$BASE/registry/collect/999999/")" 404
expect "collect" "$(status "$ADMIN_JAR" -X POST "$BASE/registry/collect/$PK/?q=Ama%20Mensah")" 200
body_has '"next":"/registry/upload/?q=Ama%20Mensah"'
expect "collected report" "$(status "$ADMIN_JAR" "$BASE/registry/generate_report/?status=Collected")" 200

expect "re-upload" "$(status "$ADMIN_JAR" -F "excel_file=@$WORK/graduates.csv" "$BASE/registry/upload/")" 200
body_has '"updated":2'
expect "search after re-upload" "$(status "$ADMIN_JAR" "$BASE/registry/upload/?q=UEW-1001")" 200
body_has '"status":"Not Collected"'
expect "collected report after re-upload" \
    "$(status "$ADMIN_JAR" "$BASE/registry/generate_report/?status=Collected")" 404

echo "[8/9] Admin panel account rules..."
expect "delete own account" \
    "$(status "$ADMIN_JAR" -X POST "$BASE/adminpanel/delete-user/$ADMIN_ID/")" 400
body_has 'You cannot delete your own account.'
expect "add clerk" "$(status "$ADMIN_JAR" -X POST -H 'content-type: application/json' \
    -d '{"username":"clerk","password":"Clerk-Desk-2024"}' "$BASE/adminpanel/add-user/")" 201
CLERK_ID=$(first_id)
expect "duplicate clerk" "$(status "$ADMIN_JAR" -X POST -H 'content-type: application/json' \
    -d '{"username":"clerk","password":"123"}' "$BASE/adminpanel/add-user/")" 400
body_has 'Username already exists.'
expect "clerk login" "$(status "$CLERK_JAR" -X POST -H 'content-type: application/json' \
    -d '{"username":"clerk","password":"Clerk-Desk-2024"}' "$BASE/login/")" 200
expect "clerk session" "$(status "$CLERK_JAR" "$BASE/me/")" 200
expect "reset clerk password" "$(status "$ADMIN_JAR" -X POST -H 'content-type: application/json' \
    -d '{"new_password":"Clerk-Reset-2025","new_password2":"Clerk-Reset-2025"}' \
    "$BASE/adminpanel/reset-password/$CLERK_ID/")" 200
expect "clerk session after reset" "$(status "$CLERK_JAR" "$BASE/me/")" 401
expect "admin session after reset" "$(status "$ADMIN_JAR" "$BASE/me/")" 200

echo "[9/9] Stopping server..."
kill -TERM $SERVER_PID
wait $SERVER_PID

echo ""
echo "=== Integration Test Complete ==="
"#;

    let output = containers::release_build(client, source)
        .with_service_binding("db", pg)
        .with_env_variable("DATABASE_URL", db_url)
        .with_env_variable("SECRET_KEY", "integration-test-secret")
        .with_env_variable("DEBUG", "True")
        .with_env_variable("SUPERUSER_PASSWORD", "Integration-Check-42")
        .with_env_variable("RUST_LOG", "info")
        .with_exec(vec![
            "sh", "-c",
            "for i in $(seq 1 30); do pg_isready -h db -p 5432 -U tracker && break; sleep 1; done",
        ])
        .with_exec(vec!["bash", "-c", test_script])
        .stdout()
        .await?;

    Ok(format!("[integration] {output}"))
}
