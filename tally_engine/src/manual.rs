/*!

This is the long-form manual for `tally_engine` and `ctally`.

## Voting schemes

| scheme      | also accepted   | payload                                  | score                                 |
|-------------|-----------------|------------------------------------------|---------------------------------------|
| `simple`    | `traditional`   | `{"value": 1..10}` on one submission     | weighted mean of the ratings          |
| `quadratic` |                 | `{"voteCount": k, "creditsSpent": k²}`   | weighted sum of the votes             |
| `ranked`    | `ranked_choice` | `{"rankings": [...]}` or `{"ranking": [...]}` | Borda points, `N - rank + 1`     |
| `approval`  |                 | `{"approvedSubmissionIds": [...]}`       | weighted number of approvals          |

For the ranked scheme, `N` is the number of distinct submissions ranked by
any counted ballot. Ranks larger than `N` earn 0 points.

Quadratic credits are reported per submission (`totalCredits`) but do not
enter the score. A quadratic ballot whose credits are not the square of its
vote count is rejected, never corrected.

## Ballot lifecycle

1. **Validation.** Each ballot is checked against the scheme and the candidate
   set. A rejected ballot is kept with one of the reason codes:
   `OUT_OF_RANGE`, `UNKNOWN_SUBMISSION`, `DUPLICATE_RANK`, `CREDIT_MISMATCH`,
   `EMPTY_SELECTION`, `SCHEME_MISMATCH`, `MISSING_SUBMISSION`.
2. **Supersession.** For the simple, quadratic and approval schemes, the most
   recent ballot of a voter for a submission replaces the earlier ones, even
   when it is invalid. Approval ballots have no target: a new approval set
   replaces the previous set as a whole. Ranked ballots are all kept.
3. **Tally.** Only ballots that are valid and not superseded count.

Results are ordered by score, then by the earliest counted ballot, then by
submission id. Ranks are never shared.

## Statistics

The categories are `overview`, `participation`, `temporal`, `demographic`,
`engagement` and `quality`. Setting `includeInvalidInStatistics` to `false`
restricts all of them to valid ballots, except the validity counts of
`overview` and the `quality` section. The number of submissions in
`overview` only counts submissions referenced by a valid ballot.

## Anomalies

| type                | subject        | severity                      | default trigger                                        |
|---------------------|----------------|-------------------------------|--------------------------------------------------------|
| `velocity_spike`    | voter          | medium, high at 2× threshold  | more than 10 valid ballots within 60 seconds           |
| `credit_budget`     | voter          | high                          | cumulative credits above `perVoterCreditBudget`        |
| `ip_clustering`     | IP prefix      | medium, high at 2× threshold  | more than 5 voters behind one /24 within 300 seconds   |
| `duplicate_pattern` | voters         | advisory                      | 3 voters casting the identical ballot within 30 seconds|
| `ip_volume_outlier` | IP address     | advisory                      | ballot count above the 95th percentile of all addresses|
| `rapid_vote`        | submission     | advisory                      | two ballots on one submission less than 5 seconds apart|

Anomalies never change a tally. The only exception is opt-in: with
`enforceCreditBudget`, the quadratic ballots of voters above the budget are
left out of the results.

## Configuration

The settings are read from a JSON object. All of them are optional.

```json
{
  "includeInvalidInStatistics": true,
  "enforceCreditBudget": false,
  "perVoterCreditBudget": 100,
  "velocitySpikeThreshold": 10,
  "velocityWindowSeconds": 60,
  "ipClusterThreshold": 5,
  "ipClusterWindowSeconds": 300,
  "ipClusterPrefixOctets": 3,
  "duplicateWindowSeconds": 30,
  "duplicateMinVoters": 3,
  "rapidVoteSeconds": 5,
  "detectors": {
    "velocitySpike": true,
    "creditBudget": true,
    "ipClustering": true,
    "duplicatePattern": true,
    "ipVolumeOutlier": true,
    "rapidVote": true
  }
}
```

Windows may not be negative, thresholds are at least 1 (2 for
`duplicateMinVoters`), prefixes are 1 to 4 octets long and a credit budget
is a positive number. Invalid settings
stop the computation before it starts.

## Command line

`ctally` reads a competition file:

```json
{
  "name": "Autumn Hackathon 2024",
  "scheme": "traditional",
  "candidates": [{ "id": "s1", "title": "Solar kiln", "author": "Team Ember" }],
  "ballotSources": [{ "provider": "csv", "filePath": "ballots.csv" }],
  "settings": { "perVoterCreditBudget": 100 },
  "affiliations": { "user:u1": "Design" },
  "categories": ["overview", "quality"]
}
```

When no candidates are listed, every submission found in the ballots is a
candidate.

### `json` ballot logs

An array of ballots:

```json
[
  {
    "id": "b1",
    "userId": "u1",
    "submissionId": "s1",
    "payload": { "value": 8 },
    "weight": 1,
    "ipAddress": "10.1.0.1",
    "userAgent": "Mozilla/5.0 Firefox/131.0",
    "castAt": "2024-10-05T09:00:00Z"
  }
]
```

Exactly one of `userId` and `sessionId` must be present. A payload of no
known shape does not stop the reading: its ballot is rejected with
`SCHEME_MISMATCH`.

### `csv` ballot logs

One ballot per row, with the header
`id,userId,sessionId,submissionId,castAt,ipAddress,userAgent,weight,value,voteCount,creditsSpent,ranking,approved`.
`ranking` and `approved` are lists of submission ids separated by `;`.
A number that does not parse, or a `voteCount` without `creditsSpent`, only
invalidates the ballot of its row.

### Summary

The output is a JSON object with the sections `competition`, `scheme`,
`results`, `statistics` and `anomalies`. With `--reference`, the sections
present in the reference file are compared with the computed ones and a diff
is printed when they differ.

*/
